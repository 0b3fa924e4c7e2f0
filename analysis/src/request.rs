//! Parsing of JSON analysis request lines.
//!
//! One line describes a game: board size, rules, setup stones and a move
//! list. It expands into one [`AnalysisRequest`] per analyzed turn. Problems
//! with a request that has an id are reported against that id and the
//! offending field; anything else is a [`RequestError::Malformed`] line.

use std::fmt;
use std::str::FromStr;

use engine_core::{Board, Loc, Move, Player, Position, Rules, ScoringRule};
use serde_json::{Map, Value};
use thiserror::Error;

const LOCS_ERROR: &str = "Must be an array of pairs of the form: [\"b\" or \"w\", GTP board vertex]";
const KOMI_ERROR: &str = "Must be a integer or half-integer from -100.0 to 100.0";
const MAX_VISITS_LIMIT: i64 = 1 << 50;

/// Every field a request may carry.
const KNOWN_FIELDS: &[&str] = &[
    "id",
    "boardXSize",
    "boardYSize",
    "initialStones",
    "moves",
    "initialPlayer",
    "analyzeTurns",
    "rules",
    "komi",
    "maxVisits",
    "analysisPVLen",
    "rootFpuReductionMax",
    "rootPolicyTemperature",
    "includeOwnership",
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    /// The line could not be tied to a request id.
    #[error("{0}")]
    Malformed(String),

    #[error("request {id}: field {field}: {message}")]
    Field {
        id: String,
        field: String,
        message: String,
    },
}

/// Side whose point of view reported values take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Black,
    White,
    SideToMove,
}

impl Perspective {
    /// Multiplier turning values seen by `root_player` into this perspective.
    pub fn sign(self, root_player: Player) -> f64 {
        match self {
            Perspective::White => root_player.white_sign(),
            Perspective::Black => -root_player.white_sign(),
            Perspective::SideToMove => 1.0,
        }
    }
}

impl FromStr for Perspective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "b" | "black" => Ok(Perspective::Black),
            "w" | "white" => Ok(Perspective::White),
            "sidetomove" => Ok(Perspective::SideToMove),
            _ => Err(format!(
                "unknown perspective '{}', expected black, white or side_to_move",
                s
            )),
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Perspective::Black => write!(f, "black"),
            Perspective::White => write!(f, "white"),
            Perspective::SideToMove => write!(f, "side_to_move"),
        }
    }
}

/// Values used when a request leaves a field out.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDefaults {
    pub max_visits: u64,
    pub analysis_pv_len: usize,
    pub root_fpu_reduction_max: f64,
    pub root_policy_temperature: f64,
    pub max_board_len: usize,
    pub white_bonus_per_handicap_stone: f64,
    pub assume_multiple_starting_black_moves_are_handicap: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            max_visits: 500,
            analysis_pv_len: 15,
            root_fpu_reduction_max: 0.1,
            root_policy_temperature: 1.0,
            max_board_len: engine_core::MAX_BOARD_LEN,
            white_bonus_per_handicap_stone: 0.0,
            assume_multiple_starting_black_moves_are_handicap: true,
        }
    }
}

/// Per-request search settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOverrides {
    pub max_visits: u64,
    pub analysis_pv_len: usize,
    pub root_fpu_reduction_max: f64,
    pub root_policy_temperature: f64,
    pub include_ownership: bool,
}

/// One position to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: String,
    pub turn_number: usize,
    pub position: Position,
    pub overrides: RequestOverrides,
}

/// Something about an accepted request the caller should know, reported
/// against one field.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestWarning {
    pub id: String,
    pub field: String,
    pub message: String,
}

/// Everything an accepted request line produced.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequest {
    /// Positions to analyze, in turn order.
    pub requests: Vec<AnalysisRequest>,
    pub warnings: Vec<RequestWarning>,
}

/// Field accessors that report failures against the request id.
struct Fields<'a> {
    id: &'a str,
    input: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn warning(&self, field: &str, message: impl Into<String>) -> RequestWarning {
        RequestWarning {
            id: self.id.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn error(&self, field: &str, message: impl Into<String>) -> RequestError {
        RequestError::Field {
            id: self.id.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.input.get(field)
    }

    fn integer(&self, field: &str, min: i64, max: i64, message: &str) -> Result<Option<i64>, RequestError> {
        let Some(value) = self.get(field) else {
            return Ok(None);
        };
        match value.as_i64() {
            Some(x) if (min..=max).contains(&x) => Ok(Some(x)),
            _ => Err(self.error(field, message)),
        }
    }

    fn double(&self, field: &str, min: f64, max: f64, message: &str) -> Result<Option<f64>, RequestError> {
        let Some(value) = self.get(field) else {
            return Ok(None);
        };
        match value.as_f64() {
            Some(x) if x.is_finite() && x >= min && x <= max => Ok(Some(x)),
            _ => Err(self.error(field, message)),
        }
    }

    fn boolean(&self, field: &str) -> Result<Option<bool>, RequestError> {
        let Some(value) = self.get(field) else {
            return Ok(None);
        };
        value
            .as_bool()
            .map(Some)
            .ok_or_else(|| self.error(field, "Must be a boolean"))
    }

    fn board_len(&self, field: &str, max_board_len: usize) -> Result<usize, RequestError> {
        let message = format!("Must provide an integer from 2 to {}", max_board_len);
        self.integer(field, 2, max_board_len as i64, &message)?
            .map(|x| x as usize)
            .ok_or_else(|| self.error(field, message))
    }

    fn moves(&self, field: &str, x_size: usize, y_size: usize, allow_pass: bool) -> Result<Vec<Move>, RequestError> {
        let Some(items) = self.get(field).and_then(Value::as_array) else {
            return Err(self.error(field, LOCS_ERROR));
        };
        items
            .iter()
            .map(|item| {
                let pair = match item.as_array().map(Vec::as_slice) {
                    Some([player, vertex]) => player.as_str().zip(vertex.as_str()),
                    _ => None,
                };
                let (player, vertex) = pair.ok_or_else(|| self.error(field, LOCS_ERROR))?;
                let player: Player = player
                    .parse()
                    .map_err(|_| self.error(field, format!("Could not parse player: {}", player)))?;
                let loc = Loc::parse_gtp(vertex, x_size, y_size)
                    .ok()
                    .filter(|loc| allow_pass || !loc.is_pass())
                    .ok_or_else(|| self.error(field, format!("Could not parse board location: {}", vertex)))?;
                Ok(Move::new(player, loc))
            })
            .collect()
    }

    fn rules(&self) -> Result<Rules, RequestError> {
        match self.get("rules") {
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| self.error("rules", format!("Unknown rules: {}", s))),
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map_err(|e| self.error("rules", format!("Unknown rules: {}", e))),
            _ => Err(self.error(
                "rules",
                "Must specify rules string, such as \"chinese\" or \"tromp-taylor\", or \"koPOSITIONALscoreAREAsui0\".",
            )),
        }
    }

    fn analyze_turns(&self, num_moves: usize) -> Result<Vec<bool>, RequestError> {
        let mut should_analyze = vec![false; num_moves + 1];
        let Some(value) = self.get("analyzeTurns") else {
            should_analyze[num_moves] = true;
            return Ok(should_analyze);
        };

        let turns: Vec<i64> = value
            .as_array()
            .and_then(|items| items.iter().map(Value::as_i64).collect::<Option<Vec<i64>>>())
            .ok_or_else(|| {
                self.error(
                    "analyzeTurns",
                    "Must specify an array of integers indicating turns to analyze",
                )
            })?;
        for turn in turns {
            match usize::try_from(turn).ok().filter(|&t| t <= num_moves) {
                Some(t) => should_analyze[t] = true,
                None => {
                    return Err(self.error("analyzeTurns", format!("Invalid turn number: {}", turn)));
                }
            }
        }
        Ok(should_analyze)
    }
}

/// Parse one request line into the positions it asks to analyze, plus any
/// warnings to report alongside them.
pub fn parse_request_line(line: &str, defaults: &RequestDefaults) -> Result<ParsedRequest, RequestError> {
    let input: Value = serde_json::from_str(line).map_err(|e| RequestError::Malformed(e.to_string()))?;
    let Some(input) = input.as_object() else {
        return Err(RequestError::Malformed(format!(
            "Request line was valid json but was not an object, ignoring: {}",
            input
        )));
    };
    let Some(id) = input.get("id").and_then(Value::as_str) else {
        return Err(RequestError::Malformed(
            "Request must have a string \"id\" field".to_string(),
        ));
    };
    let fields = Fields { id, input };
    let mut warnings: Vec<RequestWarning> = input
        .keys()
        .filter(|key| !KNOWN_FIELDS.contains(&key.as_str()))
        .map(|key| fields.warning(key, "Unknown field, ignoring"))
        .collect();

    let x_size = fields.board_len("boardXSize", defaults.max_board_len)?;
    let y_size = fields.board_len("boardYSize", defaults.max_board_len)?;

    let placements = if fields.get("initialStones").is_some() {
        fields.moves("initialStones", x_size, y_size, false)?
    } else {
        Vec::new()
    };
    if fields.get("moves").is_none() {
        return Err(fields.error("moves", "Must specify an array of [player,location] pairs"));
    }
    let moves = fields.moves("moves", x_size, y_size, true)?;

    let initial_player = match fields.get("initialPlayer") {
        None => None,
        Some(value) => Some(
            value
                .as_str()
                .and_then(|s| s.parse::<Player>().ok())
                .ok_or_else(|| fields.error("initialPlayer", "Must be \"b\" or \"w\""))?,
        ),
    };

    let should_analyze = fields.analyze_turns(moves.len())?;

    let mut rules = fields.rules()?;
    if let Some(komi) = fields.double("komi", -100.0, 100.0, KOMI_ERROR)? {
        let komi = komi as f32;
        if !Rules::komi_is_int_or_half_int(komi) {
            return Err(fields.error("rules", KOMI_ERROR));
        }
        rules.komi = komi;
    }
    if rules.scoring_rule == ScoringRule::Territory {
        warnings.push(fields.warning(
            "rules",
            format!("Rules {} use territory scoring, final positions are counted by area", rules),
        ));
    }

    let overrides = RequestOverrides {
        max_visits: fields
            .integer("maxVisits", 1, MAX_VISITS_LIMIT, "Must be an integer from 1 to 2^50")?
            .map_or(defaults.max_visits, |x| x as u64),
        analysis_pv_len: fields
            .integer("analysisPVLen", 1, 100, "Must be an integer from 1 to 100")?
            .map_or(defaults.analysis_pv_len, |x| x as usize),
        root_fpu_reduction_max: fields
            .double("rootFpuReductionMax", 0.0, 2.0, "Must be a number from 0.0 to 2.0")?
            .unwrap_or(defaults.root_fpu_reduction_max),
        root_policy_temperature: fields
            .double(
                "rootPolicyTemperature",
                0.01,
                100.0,
                "Must be a number from 0.01 to 100.0",
            )?
            .unwrap_or(defaults.root_policy_temperature),
        include_ownership: fields.boolean("includeOwnership")?.unwrap_or(false),
    };

    let mut board = Board::new(x_size, y_size).map_err(|e| fields.error("boardXSize", e.to_string()))?;
    for stone in &placements {
        board
            .set_stone(stone.loc, stone.player)
            .map_err(|e| fields.error("initialStones", e.to_string()))?;
    }

    let count_leading = defaults.assume_multiple_starting_black_moves_are_handicap;
    let initial_player = initial_player.unwrap_or_else(|| match moves.first() {
        Some(first) => first.player,
        None if Position::new(board.clone(), Player::Black, rules).handicap_stones(count_leading) > 0 => {
            Player::White
        }
        None => Player::Black,
    });

    let mut position = Position::new(board, initial_player, rules);
    let mut snapshots = Vec::new();
    for (turn, analyze) in should_analyze.iter().enumerate() {
        if *analyze {
            snapshots.push((turn, position.clone()));
        }
        let Some(mv) = moves.get(turn) else {
            break;
        };
        if position.play_as_tolerating_suicide(mv.player, mv.loc).is_err() {
            return Err(fields.error(
                "moves",
                format!("Illegal move {}: {}", turn, mv.loc.to_gtp(x_size, y_size)),
            ));
        }
    }

    let handicap = position.handicap_stones(count_leading);
    let komi = rules.komi + (handicap as f64 * defaults.white_bonus_per_handicap_stone) as f32;

    let requests = snapshots
        .into_iter()
        .map(|(turn_number, mut position)| {
            position.set_komi(komi);
            AnalysisRequest {
                id: id.to_string(),
                turn_number,
                position,
                overrides: overrides.clone(),
            }
        })
        .collect();
    Ok(ParsedRequest { requests, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Vec<AnalysisRequest>, RequestError> {
        parse_request_line(line, &RequestDefaults::default()).map(|parsed| parsed.requests)
    }

    fn field_of(err: RequestError) -> (String, String) {
        match err {
            RequestError::Field { id, field, .. } => (id, field),
            other => panic!("expected field error, got {:?}", other),
        }
    }

    #[test]
    fn test_minimal_request_analyzes_final_position() {
        let requests = parse(
            r#"{"id":"a","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[["b","E5"],["w","C3"]]}"#,
        )
        .unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.id, "a");
        assert_eq!(request.turn_number, 2);
        assert_eq!(request.position.moves().len(), 2);
        assert_eq!(request.position.next_player(), Player::Black);
        assert_eq!(request.overrides.max_visits, 500);
        assert!(!request.overrides.include_ownership);
    }

    #[test]
    fn test_analyze_turns_expand_in_turn_order() {
        let requests = parse(
            r#"{"id":"t","boardXSize":9,"boardYSize":9,"rules":"japanese",
                "moves":[["b","E5"],["w","C3"],["b","G7"]],"analyzeTurns":[3,0,1]}"#,
        )
        .unwrap();
        let turns: Vec<usize> = requests.iter().map(|r| r.turn_number).collect();
        assert_eq!(turns, vec![0, 1, 3]);
        assert_eq!(requests[0].position.moves().len(), 0);
        assert_eq!(requests[1].position.next_player(), Player::White);
        assert_eq!(requests[2].position.moves().len(), 3);
    }

    #[test]
    fn test_overrides_and_komi() {
        let requests = parse(
            r#"{"id":"o","boardXSize":19,"boardYSize":19,"rules":"tromp-taylor","moves":[],
                "komi":5.5,"maxVisits":10,"analysisPVLen":3,"rootFpuReductionMax":0.0,
                "rootPolicyTemperature":1.5,"includeOwnership":true}"#,
        )
        .unwrap();
        let request = &requests[0];
        assert_eq!(request.position.rules().komi, 5.5);
        assert_eq!(
            request.overrides,
            RequestOverrides {
                max_visits: 10,
                analysis_pv_len: 3,
                root_fpu_reduction_max: 0.0,
                root_policy_temperature: 1.5,
                include_ownership: true,
            }
        );
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(parse("{not json"), Err(RequestError::Malformed(_))));
        assert!(matches!(parse("[1,2]"), Err(RequestError::Malformed(_))));
        assert!(matches!(
            parse(r#"{"boardXSize":9}"#),
            Err(RequestError::Malformed(_))
        ));
    }

    #[test]
    fn test_field_errors_carry_id_and_field() {
        let cases = [
            (r#"{"id":"x","boardYSize":9,"rules":"chinese","moves":[]}"#, "boardXSize"),
            (r#"{"id":"x","boardXSize":1,"boardYSize":9,"rules":"chinese","moves":[]}"#, "boardXSize"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese"}"#, "moves"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[["b"]]}"#, "moves"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[["q","E5"]]}"#, "moves"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[["b","Z99"]]}"#, "moves"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"moves":[]}"#, "rules"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"martian","moves":[]}"#, "rules"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"komi":7.3}"#, "rules"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"komi":500}"#, "komi"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"maxVisits":0}"#, "maxVisits"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"analyzeTurns":[2]}"#, "analyzeTurns"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"analyzeTurns":"all"}"#, "analyzeTurns"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"initialPlayer":"red"}"#, "initialPlayer"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"includeOwnership":1}"#, "includeOwnership"),
            (r#"{"id":"x","boardXSize":9,"boardYSize":9,"rules":"chinese","moves":[],"initialStones":[["b","pass"]]}"#, "initialStones"),
        ];
        for (line, expected) in cases {
            let (id, field) = field_of(parse(line).unwrap_err());
            assert_eq!(id, "x", "line: {}", line);
            assert_eq!(field, expected, "line: {}", line);
        }
    }

    #[test]
    fn test_illegal_move_rejects_whole_request() {
        let err = parse(
            r#"{"id":"i","boardXSize":9,"boardYSize":9,"rules":"chinese",
                "moves":[["b","E5"],["w","E5"]],"analyzeTurns":[0,1,2]}"#,
        )
        .unwrap_err();
        match err {
            RequestError::Field { field, message, .. } => {
                assert_eq!(field, "moves");
                assert_eq!(message, "Illegal move 1: E5");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_handicap_setup_gives_white_the_move_and_bonus() {
        let defaults = RequestDefaults {
            white_bonus_per_handicap_stone: 1.0,
            ..RequestDefaults::default()
        };
        let requests = parse_request_line(
            r#"{"id":"h","boardXSize":19,"boardYSize":19,"rules":"chinese","komi":0.5,
                "initialStones":[["b","D4"],["b","Q16"]],"moves":[]}"#,
            &defaults,
        )
        .unwrap()
        .requests;
        let position = &requests[0].position;
        assert_eq!(position.next_player(), Player::White);
        assert_eq!(position.rules().komi, 2.5);
    }

    #[test]
    fn test_suicide_in_move_list_is_accepted() {
        let requests = parse(
            r#"{"id":"s","boardXSize":5,"boardYSize":5,"rules":"chinese",
                "moves":[["b","A1"],["w","A2"],["b","E5"],["w","B2"],["b","E4"],["w","C1"],["b","B1"]]}"#,
        )
        .unwrap();
        let position = &requests[0].position;
        assert_eq!(requests[0].turn_number, 7);
        assert_eq!(position.next_player(), Player::White);
        for vertex in ["A1", "B1"] {
            let loc = Loc::parse_gtp(vertex, 5, 5).unwrap();
            assert_eq!(position.board().stone_at(loc), None);
        }
        // Live play under these rules still forbids it.
        assert!(!position.rules().multi_stone_suicide_legal);
    }

    #[test]
    fn test_warnings_for_territory_rules_and_unknown_fields() {
        let parsed = parse_request_line(
            r#"{"id":"w","boardXSize":9,"boardYSize":9,"rules":"japanese","moves":[],"maxPlayouts":5}"#,
            &RequestDefaults::default(),
        )
        .unwrap();
        assert_eq!(parsed.requests.len(), 1);
        let fields: Vec<&str> = parsed.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["maxPlayouts", "rules"]);
        assert!(parsed.warnings.iter().all(|w| w.id == "w"));
        assert!(parsed.warnings[1].message.contains("koSIMPLEscoreTERRITORY"));

        let parsed = parse_request_line(
            r#"{"id":"c","boardXSize":9,"boardYSize":9,"rules":"koPOSITIONALscoreAREAsui0","moves":[]}"#,
            &RequestDefaults::default(),
        )
        .unwrap();
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_out_of_turn_moves_are_accepted() {
        let requests = parse(
            r#"{"id":"s","boardXSize":9,"boardYSize":9,"rules":"chinese",
                "moves":[["b","E5"],["b","C3"]]}"#,
        )
        .unwrap();
        assert_eq!(requests[0].position.next_player(), Player::White);
    }

    #[test]
    fn test_perspective_parsing_and_sign() {
        assert_eq!("side_to_move".parse::<Perspective>().unwrap(), Perspective::SideToMove);
        assert_eq!("SIDETOMOVE".parse::<Perspective>().unwrap(), Perspective::SideToMove);
        assert_eq!("b".parse::<Perspective>().unwrap(), Perspective::Black);
        assert!("blue".parse::<Perspective>().is_err());

        assert_eq!(Perspective::White.sign(Player::Black), -1.0);
        assert_eq!(Perspective::White.sign(Player::White), 1.0);
        assert_eq!(Perspective::Black.sign(Player::Black), 1.0);
        assert_eq!(Perspective::SideToMove.sign(Player::White), 1.0);
    }
}
