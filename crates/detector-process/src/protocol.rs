use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

/// One JSON line written by the detector on stdout.
///
/// ```text
/// {"type":"progress","progress":0.42,"speed":3.1}
/// {"type":"log","text":"found elimination at 63.2s"}
/// {"type":"result","clips":[[59.2,63.2]],"keyframes":[0.0,2.0],"input_duration":120.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectorMessage {
    Progress { progress: f64, speed: f64 },
    Log { text: String },
    Result(DetectorOutput),
}

/// Final detector output: kept clips and keyframe positions in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    pub clips: Vec<[f64; 2]>,
    pub keyframes: Vec<f64>,
    #[serde(default, alias = "inputDuration")]
    pub input_duration: Option<f64>,
}

/// Parses one stdout line.
///
/// # Example
/// ```
/// use detector_process::{DetectorMessage, parse_message};
///
/// let message = parse_message(r#"{"type":"progress","progress":0.5,"speed":2.0}"#)
///     .expect("valid line");
/// assert_eq!(
///     message,
///     DetectorMessage::Progress {
///         progress: 0.5,
///         speed: 2.0
///     }
/// );
/// ```
pub fn parse_message(line: &str) -> Result<DetectorMessage> {
    serde_json::from_str(line.trim()).map_err(|_| DetectorError::Parse {
        context: "detector message",
        value: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{DetectorMessage, DetectorOutput, parse_message};

    #[test]
    fn parse_result_line_with_default_duration() {
        let message = parse_message(r#"{"type":"result","clips":[[1,2.5]],"keyframes":[0,1]}"#)
            .expect("result line");

        assert_eq!(
            message,
            DetectorMessage::Result(DetectorOutput {
                clips: vec![[1.0, 2.5]],
                keyframes: vec![0.0, 1.0],
                input_duration: None,
            })
        );
    }

    #[test]
    fn parse_log_line() {
        let message = parse_message(r#"  {"type":"log","text":"opened input"}  "#).expect("log");

        assert_eq!(
            message,
            DetectorMessage::Log {
                text: String::from("opened input")
            }
        );
    }

    #[test]
    fn parse_rejects_plain_text() {
        assert!(parse_message("INFO decoding frame 12").is_err());
        assert!(parse_message(r#"{"type":"unknown"}"#).is_err());
    }
}
