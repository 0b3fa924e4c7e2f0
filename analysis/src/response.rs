//! JSON records written to the output stream, one per line.

use mcts::{AnalysisSnapshot, MoveInfo};
use serde::Serialize;

use crate::request::{AnalysisRequest, Perspective, RequestError, RequestWarning};

/// One candidate move in a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveInfoRecord {
    #[serde(rename = "move")]
    pub mv: String,
    pub visits: u64,
    pub utility: f64,
    pub winrate: f64,
    pub score_mean: f64,
    pub score_stdev: f64,
    pub prior: f64,
    pub lcb: f64,
    pub utility_lcb: f64,
    pub order: usize,
    pub pv: Vec<String>,
}

/// Search result for one analyzed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub turn_number: usize,
    pub move_infos: Vec<MoveInfoRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Vec<f64>>,
}

impl AnalysisResult {
    /// Convert a snapshot taken at the root of `request`, flipping every
    /// signed value into `perspective`.
    pub fn from_snapshot(request: &AnalysisRequest, snapshot: &AnalysisSnapshot, perspective: Perspective) -> Self {
        let board = request.position.board();
        let (x_size, y_size) = (board.x_size(), board.y_size());
        let sign = perspective.sign(snapshot.root_player);
        let flip_prob = |p: f64| 0.5 + sign * (p - 0.5);

        let move_infos = snapshot
            .moves
            .iter()
            .map(|info: &MoveInfo| MoveInfoRecord {
                mv: info.loc.to_gtp(x_size, y_size),
                visits: info.visits,
                utility: sign * info.utility,
                winrate: flip_prob(info.winrate()),
                score_mean: sign * info.score_mean,
                score_stdev: info.score_stdev,
                prior: info.prior,
                lcb: flip_prob(info.lcb),
                utility_lcb: sign * info.utility_lcb,
                order: info.order,
                pv: info.pv.iter().map(|loc| loc.to_gtp(x_size, y_size)).collect(),
            })
            .collect();

        let ownership = request.overrides.include_ownership.then(|| {
            snapshot
                .ownership
                .as_ref()
                .map(|own| own.iter().map(|&o| sign * o).collect())
                .unwrap_or_else(|| vec![0.0; board.area()])
        });

        Self {
            id: request.id.clone(),
            turn_number: request.turn_number,
            move_infos,
            ownership,
        }
    }
}

/// Anything written to the output stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputRecord {
    Result(AnalysisResult),
    /// A search for an accepted request failed.
    TurnError {
        id: String,
        #[serde(rename = "turnNumber")]
        turn_number: usize,
        error: String,
    },
    FieldError {
        id: String,
        field: String,
        error: String,
    },
    /// The request was accepted but something in it was ignored or
    /// approximated.
    Warning {
        id: String,
        field: String,
        warning: String,
    },
    Error {
        error: String,
    },
}

impl OutputRecord {
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"failed to serialize record: {}\"}}", e))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            OutputRecord::Result(result) => Some(&result.id),
            OutputRecord::TurnError { id, .. }
            | OutputRecord::FieldError { id, .. }
            | OutputRecord::Warning { id, .. } => Some(id),
            OutputRecord::Error { .. } => None,
        }
    }
}

impl From<RequestError> for OutputRecord {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Malformed(error) => OutputRecord::Error { error },
            RequestError::Field { id, field, message } => OutputRecord::FieldError {
                id,
                field,
                error: message,
            },
        }
    }
}

impl From<RequestWarning> for OutputRecord {
    fn from(warning: RequestWarning) -> Self {
        OutputRecord::Warning {
            id: warning.id,
            field: warning.field,
            warning: warning.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestOverrides;
    use engine_core::{Loc, Player, Position, Rules};
    use serde_json::json;

    fn request(include_ownership: bool) -> AnalysisRequest {
        AnalysisRequest {
            id: "r1".into(),
            turn_number: 0,
            position: Position::empty(2, 2, Rules::chinese()).unwrap(),
            overrides: RequestOverrides {
                max_visits: 10,
                analysis_pv_len: 5,
                root_fpu_reduction_max: 0.1,
                root_policy_temperature: 1.0,
                include_ownership,
            },
        }
    }

    fn snapshot() -> AnalysisSnapshot {
        AnalysisSnapshot {
            root_player: Player::Black,
            root_visits: 10,
            root_values: None,
            moves: vec![MoveInfo {
                loc: Loc::point(0, 1),
                visits: 9,
                utility: 0.4,
                win_loss: 0.5,
                score_mean: 2.0,
                score_stdev: 3.0,
                prior: 0.3,
                lcb: 0.6,
                utility_lcb: 0.2,
                order: 0,
                pv: vec![Loc::point(0, 1), Loc::Pass],
            }],
            ownership: Some(vec![1.0, -0.5, 0.0, 0.25]),
        }
    }

    #[test]
    fn test_side_to_move_keeps_values() {
        let result = AnalysisResult::from_snapshot(&request(true), &snapshot(), Perspective::SideToMove);
        let info = &result.move_infos[0];
        assert_eq!(info.mv, "A1");
        assert_eq!(info.winrate, 0.75);
        assert_eq!(info.lcb, 0.6);
        assert_eq!(info.score_mean, 2.0);
        assert_eq!(info.pv, vec!["A1".to_string(), "pass".to_string()]);
        assert_eq!(result.ownership, Some(vec![1.0, -0.5, 0.0, 0.25]));
    }

    #[test]
    fn test_white_perspective_flips_black_root() {
        let result = AnalysisResult::from_snapshot(&request(true), &snapshot(), Perspective::White);
        let info = &result.move_infos[0];
        assert_eq!(info.winrate, 0.25);
        assert!((info.lcb - 0.4).abs() < 1e-12);
        assert_eq!(info.utility, -0.4);
        assert_eq!(info.utility_lcb, -0.2);
        assert_eq!(info.score_mean, -2.0);
        assert_eq!(info.score_stdev, 3.0);
        assert_eq!(result.ownership, Some(vec![-1.0, 0.5, 0.0, -0.25]));
    }

    #[test]
    fn test_ownership_omitted_unless_requested() {
        let result = AnalysisResult::from_snapshot(&request(false), &snapshot(), Perspective::White);
        let value = serde_json::to_value(OutputRecord::Result(result)).unwrap();
        assert!(value.get("ownership").is_none());
        assert_eq!(value["id"], "r1");
        assert_eq!(value["turnNumber"], 0);
        assert_eq!(value["moveInfos"][0]["move"], "A1");
        assert_eq!(value["moveInfos"][0]["utilityLcb"], -0.2);
    }

    #[test]
    fn test_error_records_serialize_flat() {
        let record: OutputRecord = RequestError::Field {
            id: "x".into(),
            field: "moves".into(),
            message: "bad".into(),
        }
        .into();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": "x", "field": "moves", "error": "bad"})
        );
        assert_eq!(record.id(), Some("x"));

        let record: OutputRecord = RequestWarning {
            id: "x".into(),
            field: "rules".into(),
            message: "approximated".into(),
        }
        .into();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": "x", "field": "rules", "warning": "approximated"})
        );
        assert_eq!(record.id(), Some("x"));

        let record: OutputRecord = RequestError::Malformed("oops".into()).into();
        assert_eq!(record.to_json_line(), r#"{"error":"oops"}"#);
        assert_eq!(record.id(), None);
    }
}
