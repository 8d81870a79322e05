//! Finished-trial record shared by worker, slave, and master
//!
//! A `BenchmarkTestResult` is produced when a trial terminates and is never
//! mutated afterwards. It travels over RPC and into the final report, so its
//! serialized shape is part of the stable report schema.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a trial ended
///
/// Encoded on the wire as `1` (success) or `2` (error); these values must
/// remain stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::FromRepr,
)]
#[serde(into = "i64", try_from = "i64")]
#[repr(i64)]
pub enum EndState {
    /// Trial completed successfully
    #[strum(serialize = "success")]
    Success = 1,
    /// Trial failed; the result carries the failure detail
    #[strum(serialize = "error")]
    Error = 2,
}

/// Raised when a wire value is neither 1 nor 2
#[derive(Debug, Error)]
#[error("invalid end state {0}, expected 1 (success) or 2 (error)")]
pub struct InvalidEndState(i64);

impl From<EndState> for i64 {
    fn from(state: EndState) -> Self {
        state as i64
    }
}

impl TryFrom<i64> for EndState {
    type Error = InvalidEndState;

    fn try_from(value: i64) -> Result<Self, InvalidEndState> {
        Self::from_repr(value).ok_or(InvalidEndState(value))
    }
}

/// Immutable record of one finished trial
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkTestResult {
    /// Group label the trial was begun under
    pub group: String,
    /// Success or error
    pub end_state: EndState,
    /// `end_time - begin_time`, in milliseconds
    pub duration: i64,
    /// Trial start, milliseconds since UNIX epoch
    pub begin_time: i64,
    /// Trial end, milliseconds since UNIX epoch
    pub end_time: i64,
    /// Failure detail; empty for successful trials
    pub error_result: String,
}

impl BenchmarkTestResult {
    /// Create a successful trial record
    pub fn success(group: impl Into<String>, begin_time: i64, end_time: i64) -> Self {
        Self {
            group: group.into(),
            end_state: EndState::Success,
            duration: end_time - begin_time,
            begin_time,
            end_time,
            error_result: String::new(),
        }
    }

    /// Create a failed trial record
    pub fn error(
        group: impl Into<String>,
        begin_time: i64,
        end_time: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            end_state: EndState::Error,
            duration: end_time - begin_time,
            begin_time,
            end_time,
            error_result: reason.into(),
        }
    }

    /// Whether the trial ended in success
    pub fn is_success(&self) -> bool {
        self.end_state == EndState::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_constructor() {
        let result = BenchmarkTestResult::success("g", 1000, 1050);
        assert_eq!(result.duration, 50);
        assert!(result.is_success());
        assert!(result.error_result.is_empty());
    }

    #[test]
    fn test_error_constructor() {
        let result = BenchmarkTestResult::error("g", 1000, 1200, "boom");
        assert_eq!(result.duration, 200);
        assert!(!result.is_success());
        assert_eq!(result.error_result, "boom");
    }

    #[test]
    fn test_end_state_wire_values() {
        assert_eq!(i64::from(EndState::Success), 1);
        assert_eq!(i64::from(EndState::Error), 2);
        assert_eq!(EndState::try_from(2).unwrap(), EndState::Error);
        assert!(EndState::try_from(3).is_err());
    }

    #[test]
    fn test_serialization() {
        let result = BenchmarkTestResult::success("checkout", 1000, 1050);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"endState\":1"));
        assert!(json.contains("\"beginTime\":1000"));
        assert!(json.contains("\"endTime\":1050"));
        assert!(json.contains("\"errorResult\":\"\""));

        let parsed: BenchmarkTestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
