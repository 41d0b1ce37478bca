//! Execution results of command invocations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Result code returned by every command and event invocation.
///
/// The set is closed: callers can match exhaustively on which failure
/// occurred instead of receiving an opaque boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionResult {
    Ok,
    CommandDisabled,
    CommandException,
    MailboxFull,
    InvalidCommand,
    InvalidInput,
    FunctionNotBound,
    Timeout,
    NetworkError,
}

impl ExecutionResult {
    /// Whether the invocation succeeded.
    pub fn is_ok(self) -> bool {
        self == ExecutionResult::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionResult::Ok => "OK",
            ExecutionResult::CommandDisabled => "COMMAND_DISABLED",
            ExecutionResult::CommandException => "COMMAND_EXCEPTION",
            ExecutionResult::MailboxFull => "MAILBOX_FULL",
            ExecutionResult::InvalidCommand => "INVALID_COMMAND",
            ExecutionResult::InvalidInput => "INVALID_INPUT",
            ExecutionResult::FunctionNotBound => "FUNCTION_NOT_BOUND",
            ExecutionResult::Timeout => "TIMEOUT",
            ExecutionResult::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result code plus the value produced by a read or qualified-read command.
///
/// Void and write commands always carry `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub result: ExecutionResult,
    #[serde(default)]
    pub value: Value,
}

impl CommandReply {
    /// Successful reply carrying a value.
    pub fn ok(value: Value) -> Self {
        Self {
            result: ExecutionResult::Ok,
            value,
        }
    }

    /// Successful reply without a value.
    pub fn done() -> Self {
        Self::ok(Value::Null)
    }

    /// Failed reply.
    pub fn failed(result: ExecutionResult) -> Self {
        Self {
            result,
            value: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Convert into the produced value, or the failure code.
    pub fn into_result(self) -> Result<Value, ExecutionResult> {
        if self.result.is_ok() {
            Ok(self.value)
        } else {
            Err(self.result)
        }
    }
}

impl From<ExecutionResult> for CommandReply {
    fn from(result: ExecutionResult) -> Self {
        Self {
            result,
            value: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_string(&ExecutionResult::MailboxFull).unwrap();
        assert_eq!(json, "\"MAILBOX_FULL\"");
        assert_eq!(ExecutionResult::MailboxFull.to_string(), "MAILBOX_FULL");
    }

    #[test]
    fn test_reply_into_result() {
        let reply = CommandReply::ok(serde_json::json!(3));
        assert_eq!(reply.into_result(), Ok(serde_json::json!(3)));

        let reply = CommandReply::failed(ExecutionResult::CommandDisabled);
        assert_eq!(reply.into_result(), Err(ExecutionResult::CommandDisabled));
    }

    #[test]
    fn test_reply_missing_value_deserializes_as_null() {
        let reply: CommandReply = serde_json::from_str(r#"{"result":"OK"}"#).unwrap();
        assert!(reply.is_ok());
        assert!(reply.value.is_null());
    }
}
