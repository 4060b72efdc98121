//! System prompt template for the agent.

use crate::tools::ToolRegistry;

/// Build the system prompt with tool descriptions.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    if tools.is_empty() {
        return "You are a helpful assistant. Answer the user's questions directly.".to_string();
    }

    let tool_descriptions = tools
        .schemas()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a helpful assistant that can call tools to answer the user's questions.

## Your Capabilities

You have access to the following tools:
{tool_descriptions}

## Rules

1. **Use tools for facts they provide** - Don't guess values a tool can look up.

2. **Recover from tool errors** - A tool result starting with "Error" means the call failed. Fix the arguments, pick another tool, or explain the problem to the user.

3. **Answer plainly** - Once you have what you need, reply to the user in natural language."#,
        tool_descriptions = tool_descriptions
    )
}
