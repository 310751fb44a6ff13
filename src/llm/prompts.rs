/// Build the system instruction placed at the head of every session.
///
/// A non-empty `instructions` string from config replaces the built-in
/// prompt entirely.
pub fn system_prompt(instructions: &str, agent_name: &str, tool_names: &[&str]) -> String {
    if !instructions.trim().is_empty() {
        return instructions.to_string();
    }

    let tools = if tool_names.is_empty() {
        "none".to_string()
    } else {
        tool_names.join(", ")
    };

    format!(
        r#"You are {agent_name}, a helpful assistant that works with the files in the user's workspace.
Be friendly and keep your answers concise.

You can call these tools: {tools}.

Guidelines:
- Paths are relative to the workspace root unless the user gives an absolute path.
- Read a file before editing it so previous_text matches the current content exactly.
- To create a file, or to replace its whole content, call edit_file with an empty previous_text.
- If a tool returns an error, explain it or retry with corrected arguments.
- When the task is done, answer in plain text without calling more tools."#
    )
}
