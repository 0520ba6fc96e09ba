use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, ARTIFACT_ID_COMMANDS, EXPORT_COMMAND, NO_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
    TEXT_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Parses one line of studio input. Slash commands map to actions; any other
/// text replaces the brief description.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, TEXT_ARG_COMMANDS) {
                return Intent::new(action, text)
                    .with_arg("value", Value::String(parse_single_arg(arg)));
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action, text)
                    .with_arg("path", Value::String(parse_single_arg(arg)));
            }

            if let Some(action) = find_action(&command, ARTIFACT_ID_COMMANDS) {
                let id = split_args(arg).into_iter().next();
                return Intent::new(action, text)
                    .with_arg("id", id.map(Value::String).unwrap_or(Value::Null));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == EXPORT_COMMAND.command {
                let mut parts = split_args(arg).into_iter();
                let id = parts.next();
                let dir = parts.next();
                return Intent::new(EXPORT_COMMAND.action, text)
                    .with_arg("id", id.map(Value::String).unwrap_or(Value::Null))
                    .with_arg("dir", dir.map(Value::String).unwrap_or(Value::Null));
            }

            return Intent::new("unknown", text)
                .with_arg("command", Value::String(command))
                .with_arg("arg", Value::String(arg.to_string()));
        }
    }

    Intent::new("set_description", text).with_arg("value", Value::String(raw_trimmed.to_string()))
}
