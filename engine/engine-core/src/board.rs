//! Board representation with captures, ko and area classification.

use std::fmt;

use crate::error::RulesError;
use crate::player::{Loc, Player};

/// Largest supported board side.
pub const MAX_BOARD_LEN: usize = 19;

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Zobrist key for a stone of `player` at `idx`.
fn stone_key(idx: usize, player: Player) -> u64 {
    splitmix64(((idx as u64) << 1) | player.index() as u64)
}

/// A rectangular Go board.
///
/// Points are indexed row-major with `y = 0` as the top row. The board
/// tracks the simple-ko point, capture counts and an incremental Zobrist
/// hash of the stone configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    x_size: usize,
    y_size: usize,
    stones: Vec<Option<Player>>,
    ko_point: Option<usize>,
    captures: [u32; 2],
    hash: u64,
}

impl Board {
    pub fn new(x_size: usize, y_size: usize) -> Result<Self, RulesError> {
        let valid = 2..=MAX_BOARD_LEN;
        if !valid.contains(&x_size) || !valid.contains(&y_size) {
            return Err(RulesError::InvalidBoardSize {
                x_size,
                y_size,
                max: MAX_BOARD_LEN,
            });
        }
        Ok(Self {
            x_size,
            y_size,
            stones: vec![None; x_size * y_size],
            ko_point: None,
            captures: [0; 2],
            hash: 0,
        })
    }

    /// Parse a board from rows of `.` (empty), `X` (black) and `O` (white).
    ///
    /// Whitespace inside rows is ignored. Stones are placed as given, with no
    /// liberty checks.
    pub fn parse(text: &str) -> Result<Self, RulesError> {
        let rows: Vec<Vec<char>> = text
            .lines()
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>())
            .filter(|row| !row.is_empty())
            .collect();
        let y_size = rows.len();
        let x_size = rows.first().map_or(0, Vec::len);
        let mut board = Board::new(x_size, y_size)?;

        for (y, row) in rows.iter().enumerate() {
            if row.len() != x_size {
                return Err(RulesError::InvalidBoardText(format!(
                    "row {} has {} points, expected {}",
                    y,
                    row.len(),
                    x_size
                )));
            }
            for (x, &c) in row.iter().enumerate() {
                let player = match c {
                    '.' | '+' => None,
                    'X' | 'x' => Some(Player::Black),
                    'O' | 'o' => Some(Player::White),
                    other => {
                        return Err(RulesError::InvalidBoardText(format!(
                            "unexpected character '{}'",
                            other
                        )))
                    }
                };
                if let Some(p) = player {
                    board.place(y * x_size + x, p);
                }
            }
        }
        Ok(board)
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    pub fn area(&self) -> usize {
        self.x_size * self.y_size
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Stones captured by `player` so far.
    pub fn captures(&self, player: Player) -> u32 {
        self.captures[player.index()]
    }

    pub fn index_of(&self, loc: Loc) -> Option<usize> {
        match loc {
            Loc::Pass => None,
            Loc::Point { x, y } => {
                let (x, y) = (x as usize, y as usize);
                (x < self.x_size && y < self.y_size).then(|| y * self.x_size + x)
            }
        }
    }

    pub fn loc_of(&self, idx: usize) -> Loc {
        Loc::point(idx % self.x_size, idx / self.x_size)
    }

    pub fn stone_at(&self, loc: Loc) -> Option<Player> {
        self.index_of(loc).and_then(|idx| self.stones[idx])
    }

    /// Point where an immediate recapture is forbidden, if any.
    pub fn ko_point(&self) -> Option<Loc> {
        self.ko_point.map(|idx| self.loc_of(idx))
    }

    pub fn count_stones(&self, player: Player) -> usize {
        self.stones.iter().filter(|&&s| s == Some(player)).count()
    }

    /// All board points in index order.
    pub fn points(&self) -> impl Iterator<Item = Loc> + '_ {
        (0..self.area()).map(move |idx| self.loc_of(idx))
    }

    fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> {
        let (x, y) = (idx % self.x_size, idx / self.x_size);
        let w = self.x_size;
        [
            (x > 0).then(|| idx - 1),
            (x + 1 < w).then(|| idx + 1),
            (y > 0).then(|| idx - w),
            (y + 1 < self.y_size).then(|| idx + w),
        ]
        .into_iter()
        .flatten()
    }

    /// Stones of the group containing `idx` and its liberty count.
    fn group(&self, idx: usize) -> (Vec<usize>, usize) {
        const MEMBER: u8 = 1;
        const LIBERTY: u8 = 2;

        let Some(color) = self.stones[idx] else {
            return (Vec::new(), 0);
        };
        let mut marks = vec![0u8; self.area()];
        let mut stack = vec![idx];
        let mut members = Vec::new();
        let mut liberties = 0;
        marks[idx] = MEMBER;

        while let Some(cur) = stack.pop() {
            members.push(cur);
            for n in self.neighbors(cur) {
                match self.stones[n] {
                    None if marks[n] != LIBERTY => {
                        marks[n] = LIBERTY;
                        liberties += 1;
                    }
                    Some(c) if c == color && marks[n] != MEMBER => {
                        marks[n] = MEMBER;
                        stack.push(n);
                    }
                    _ => {}
                }
            }
        }
        (members, liberties)
    }

    fn place(&mut self, idx: usize, player: Player) {
        self.stones[idx] = Some(player);
        self.hash ^= stone_key(idx, player);
    }

    fn remove(&mut self, idx: usize) {
        if let Some(player) = self.stones[idx].take() {
            self.hash ^= stone_key(idx, player);
        }
    }

    /// Whether `player` may play at `loc`, ignoring whole-board repetition.
    pub fn is_legal(
        &self,
        loc: Loc,
        player: Player,
        multi_stone_suicide_legal: bool,
        respect_ko_point: bool,
    ) -> bool {
        let Some(idx) = self.index_of(loc) else {
            return loc.is_pass();
        };
        if self.stones[idx].is_some() {
            return false;
        }
        if respect_ko_point && self.ko_point == Some(idx) {
            return false;
        }

        let mut joins_own = false;
        for n in self.neighbors(idx) {
            match self.stones[n] {
                None => return true,
                Some(c) if c == player => {
                    joins_own = true;
                    if self.group(n).1 > 1 {
                        return true;
                    }
                }
                Some(_) => {
                    if self.group(n).1 == 1 {
                        return true;
                    }
                }
            }
        }
        joins_own && multi_stone_suicide_legal
    }

    /// Play a move assumed legal: place, capture, remove suicided stones and
    /// update the ko point.
    pub(crate) fn apply_move(&mut self, loc: Loc, player: Player) {
        let Some(idx) = self.index_of(loc) else {
            self.ko_point = None;
            return;
        };
        let opp = player.opponent();
        self.place(idx, player);

        let adjacent: Vec<usize> = self.neighbors(idx).collect();
        let mut captured = Vec::new();
        for n in adjacent {
            if self.stones[n] == Some(opp) {
                let (members, liberties) = self.group(n);
                if liberties == 0 {
                    for m in members {
                        self.remove(m);
                        captured.push(m);
                    }
                }
            }
        }
        self.captures[player.index()] += captured.len() as u32;

        let (own, own_liberties) = self.group(idx);
        if own_liberties == 0 {
            for &m in &own {
                self.remove(m);
            }
            self.captures[opp.index()] += own.len() as u32;
            self.ko_point = None;
            return;
        }

        self.ko_point = if captured.len() == 1 && own.len() == 1 && own_liberties == 1 {
            Some(captured[0])
        } else {
            None
        };
    }

    /// Hash of the stone configuration after `player` plays at `loc`.
    pub(crate) fn hash_after(&self, loc: Loc, player: Player) -> u64 {
        let Some(idx) = self.index_of(loc) else {
            return self.hash;
        };
        let opp = player.opponent();
        let mut hash = self.hash ^ stone_key(idx, player);
        let mut removed = vec![false; self.area()];
        let mut any_captured = false;

        for n in self.neighbors(idx) {
            if self.stones[n] == Some(opp) && !removed[n] {
                let (members, liberties) = self.group(n);
                if liberties == 1 {
                    any_captured = true;
                    for m in members {
                        removed[m] = true;
                        hash ^= stone_key(m, opp);
                    }
                }
            }
        }

        if !any_captured && self.neighbors(idx).all(|n| self.stones[n].is_some()) {
            let mut suicided = Vec::new();
            for n in self.neighbors(idx) {
                if self.stones[n] == Some(player) {
                    let (members, liberties) = self.group(n);
                    if liberties > 1 {
                        return hash;
                    }
                    suicided.extend(members);
                }
            }
            suicided.sort_unstable();
            suicided.dedup();
            hash ^= stone_key(idx, player);
            for m in suicided {
                hash ^= stone_key(m, player);
            }
        }
        hash
    }

    /// Place a setup stone. Fails if the point is occupied or the stone
    /// would leave any group without liberties.
    pub fn set_stone(&mut self, loc: Loc, player: Player) -> Result<(), RulesError> {
        let (x_size, y_size) = (self.x_size, self.y_size);
        let invalid = || RulesError::InvalidStone(loc.to_gtp(x_size, y_size));
        let idx = self.index_of(loc).ok_or_else(invalid)?;
        if self.stones[idx].is_some() {
            return Err(invalid());
        }
        self.place(idx, player);

        let opp = player.opponent();
        let dead = self.group(idx).1 == 0
            || self
                .neighbors(idx)
                .any(|n| self.stones[n] == Some(opp) && self.group(n).1 == 0);
        if dead {
            self.remove(idx);
            return Err(invalid());
        }
        Ok(())
    }

    /// Owner of every point under area counting.
    ///
    /// Stones belong to their color. Empty regions bordered by a single
    /// color belong to that color, others to nobody.
    pub fn area_ownership(&self) -> Vec<Option<Player>> {
        let mut owner = self.stones.clone();
        let mut visited = vec![false; self.area()];

        for start in 0..self.area() {
            if self.stones[start].is_some() || visited[start] {
                continue;
            }
            let mut region = Vec::new();
            let mut borders = [false; 2];
            let mut stack = vec![start];
            visited[start] = true;

            while let Some(cur) = stack.pop() {
                region.push(cur);
                for n in self.neighbors(cur) {
                    match self.stones[n] {
                        Some(p) => borders[p.index()] = true,
                        None if !visited[n] => {
                            visited[n] = true;
                            stack.push(n);
                        }
                        None => {}
                    }
                }
            }

            let region_owner = match borders {
                [true, false] => Some(Player::Black),
                [false, true] => Some(Player::White),
                _ => None,
            };
            for idx in region {
                owner[idx] = region_owner;
            }
        }
        owner
    }

    /// White's area minus black's area, without komi.
    pub fn area_score_white(&self) -> f32 {
        self.area_ownership()
            .iter()
            .map(|o| match o {
                Some(Player::White) => 1.0,
                Some(Player::Black) => -1.0,
                None => 0.0,
            })
            .sum()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.y_size {
            for x in 0..self.x_size {
                let c = match self.stones[y * self.x_size + x] {
                    None => '.',
                    Some(Player::Black) => 'X',
                    Some(Player::White) => 'O',
                };
                write!(f, "{}", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(Board::new(1, 9).is_err());
        assert!(Board::new(9, MAX_BOARD_LEN + 1).is_err());
        assert!(Board::new(2, 2).is_ok());
    }

    #[test]
    fn test_parse_and_display() {
        let board = Board::parse("X . O\n. . .\n. . .").unwrap();
        assert_eq!(board.stone_at(Loc::point(0, 0)), Some(Player::Black));
        assert_eq!(board.stone_at(Loc::point(2, 0)), Some(Player::White));
        assert_eq!(board.to_string(), "X.O\n...\n...\n");
        assert!(Board::parse("X.\n...").is_err());
    }

    #[test]
    fn test_capture_and_ko_point() {
        let mut board = Board::parse(
            ".XO..
             XO.O.
             .XO..
             .....
             .....",
        )
        .unwrap();
        board.apply_move(Loc::point(2, 1), Player::Black);

        assert_eq!(board.stone_at(Loc::point(1, 1)), None);
        assert_eq!(board.captures(Player::Black), 1);
        assert_eq!(board.ko_point(), Some(Loc::point(1, 1)));
        assert!(!board.is_legal(Loc::point(1, 1), Player::White, false, true));
        assert!(board.is_legal(Loc::point(1, 1), Player::White, false, false));
    }

    #[test]
    fn test_single_stone_suicide_illegal() {
        let board = Board::parse(".X.\nX..\n...").unwrap();
        assert!(!board.is_legal(Loc::point(0, 0), Player::White, true, true));
        assert!(board.is_legal(Loc::point(0, 0), Player::Black, false, true));
    }

    #[test]
    fn test_multi_stone_suicide() {
        let mut board = Board::parse("OX.\n.X.\nX..").unwrap();
        let loc = Loc::point(0, 1);
        assert!(!board.is_legal(loc, Player::White, false, true));
        assert!(board.is_legal(loc, Player::White, true, true));

        let predicted = board.hash_after(loc, Player::White);
        board.apply_move(loc, Player::White);
        assert_eq!(board.stone_at(Loc::point(0, 0)), None);
        assert_eq!(board.captures(Player::Black), 2);
        assert_eq!(board.hash(), predicted);
    }

    #[test]
    fn test_hash_after_matches_capture() {
        let mut board = Board::parse(".X.\nXO.\n.X.").unwrap();
        let loc = Loc::point(2, 1);
        let predicted = board.hash_after(loc, Player::Black);
        board.apply_move(loc, Player::Black);
        assert_eq!(board.hash(), predicted);
        assert_eq!(board.stone_at(Loc::point(1, 1)), None);
    }

    #[test]
    fn test_set_stone_rejects_dead_stone() {
        let mut board = Board::parse(".X.\nX..\n...").unwrap();
        assert!(board.set_stone(Loc::point(0, 0), Player::White).is_err());
        assert_eq!(board.stone_at(Loc::point(0, 0)), None);
        assert!(board.set_stone(Loc::point(1, 0), Player::White).is_err());
        assert!(board.set_stone(Loc::point(2, 2), Player::White).is_ok());
    }

    #[test]
    fn test_area_ownership() {
        let board = Board::parse(".XO.\n.XO.\n.XO.").unwrap();
        let owner = board.area_ownership();
        assert_eq!(owner[0], Some(Player::Black));
        assert_eq!(owner[3], Some(Player::White));
        assert_eq!(board.area_score_white(), 0.0);

        let dame = Board::parse("X.O\n...\n...").unwrap();
        assert_eq!(dame.area_ownership()[1], None);
    }
}
