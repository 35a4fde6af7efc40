//! Prompt construction for Python -> C++ rewrites.

use crate::provider::{ChatMessage, CompletionRequest};
use crate::toolchain::Platform;

const USER_INSTRUCTIONS: &str = "Rewrite this Python code in C++ with the fastest possible \
implementation that produces identical output in the least time. Respond only with C++ code; \
do not explain your work other than a few comments. Pay attention to number types to ensure \
no int overflows. Remember to #include all necessary C++ packages such as iomanip.";

/// Builds the system and user messages for one translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    target: String,
}

impl PromptBuilder {
    /// `target` names the machine the C++ will be compiled for, e.g. "an M1 Mac".
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn for_platform(platform: Platform) -> Self {
        Self::new(platform.description())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are an assistant that reimplements Python code in high performance C++ for {}. \
Respond only with C++ code; use comments sparingly and do not provide any explanation other \
than occasional comments. The C++ response needs to produce an identical output in the fastest \
possible time.",
            self.target
        )
    }

    /// Instructions, a blank line, then the Python source verbatim.
    pub fn user_prompt(&self, python: &str) -> String {
        let mut prompt = String::with_capacity(USER_INSTRUCTIONS.len() + python.len() + 2);
        prompt.push_str(USER_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(python);
        prompt
    }

    pub fn messages(&self, python: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(self.user_prompt(python)),
        ]
    }

    pub fn request(&self, python: &str) -> CompletionRequest {
        CompletionRequest::new(self.messages(python))
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::for_platform(Platform::current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    #[test]
    fn test_user_prompt_embeds_source_verbatim() {
        let python = "def f(x):\n    return x * 2\n\nprint(f(21))\n";
        let prompt = PromptBuilder::new("an M1 Mac").user_prompt(python);

        assert!(prompt.starts_with("Rewrite this Python code in C++"));
        assert!(prompt.ends_with(&format!("\n\n{}", python)));
        assert!(prompt.contains("int overflows"));
        assert!(prompt.contains("iomanip"));
    }

    #[test]
    fn test_system_prompt_names_target() {
        let builder = PromptBuilder::new("a Linux x86_64 machine");
        let system = builder.system_prompt();
        assert!(system.contains("high performance C++ for a Linux x86_64 machine."));
        assert!(system.contains("Respond only with C++ code"));
    }

    #[test]
    fn test_messages_are_system_then_user() {
        let messages = PromptBuilder::for_platform(Platform::MacArm).messages("print(1)");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("an M1 Mac"));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.ends_with("print(1)"));
    }
}
