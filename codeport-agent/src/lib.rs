//! # codeport agent
//!
//! Drives one Python -> C++ rewrite from start to finish:
//! 1. Build the prompt from the Python source
//! 2. Stream the model's reply, sanitizing as it arrives
//! 3. Overwrite the fixed `.cpp` output file
//! 4. Detect a compiler, build, and run the binary
//! 5. Optionally run the Python original and compare
//!
//! Every step is a plain call; nothing carries over between invocations
//! except the output file.

mod translator;

pub use translator::{Translation, Translator};
