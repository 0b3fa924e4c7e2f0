//! Game positions: board, rules, side to move and move history.

use crate::board::Board;
use crate::error::RulesError;
use crate::player::{Loc, Player};
use crate::rules::{KoRule, Rules};

/// A move made by a specific player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub player: Player,
    pub loc: Loc,
}

impl Move {
    pub fn new(player: Player, loc: Loc) -> Self {
        Self { player, loc }
    }
}

/// A full game position.
///
/// Besides the current board this keeps the starting setup and every move
/// played since, which is what handicap detection and superko need.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
    rules: Rules,
    next_player: Player,
    initial_board: Board,
    initial_player: Player,
    moves: Vec<Move>,
    consecutive_passes: u32,
    /// Board hash and side to move of every position reached so far.
    history: Vec<(u64, Player)>,
}

impl Position {
    pub fn new(board: Board, next_player: Player, rules: Rules) -> Self {
        let history = vec![(board.hash(), next_player)];
        Self {
            initial_board: board.clone(),
            board,
            rules,
            next_player,
            initial_player: next_player,
            moves: Vec::new(),
            consecutive_passes: 0,
            history,
        }
    }

    /// Empty board with black to move.
    pub fn empty(x_size: usize, y_size: usize, rules: Rules) -> Result<Self, RulesError> {
        Ok(Self::new(Board::new(x_size, y_size)?, Player::Black, rules))
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn next_player(&self) -> Player {
        self.next_player
    }

    pub fn initial_board(&self) -> &Board {
        &self.initial_board
    }

    pub fn initial_player(&self) -> Player {
        self.initial_player
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn last_move(&self) -> Option<Move> {
        self.moves.last().copied()
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.rules.komi = komi;
    }

    /// Override the side to move without playing a move.
    pub fn set_next_player(&mut self, player: Player) {
        self.next_player = player;
    }

    /// Two consecutive passes end the game.
    pub fn is_game_over(&self) -> bool {
        self.consecutive_passes >= 2
    }

    /// Whether the side to move may play `loc`.
    pub fn is_legal(&self, loc: Loc) -> bool {
        self.is_legal_for(self.next_player, loc)
    }

    pub fn is_legal_for(&self, player: Player, loc: Loc) -> bool {
        self.is_legal_with(player, loc, self.rules.multi_stone_suicide_legal)
    }

    fn is_legal_with(&self, player: Player, loc: Loc, multi_stone_suicide_legal: bool) -> bool {
        if loc.is_pass() {
            return true;
        }
        let simple_ko = self.rules.ko_rule == KoRule::Simple;
        if !self.board.is_legal(loc, player, multi_stone_suicide_legal, simple_ko) {
            return false;
        }
        if simple_ko {
            return true;
        }

        let hash = self.board.hash_after(loc, player);
        let next = player.opponent();
        match self.rules.ko_rule {
            KoRule::Positional => !self.history.iter().any(|&(h, _)| h == hash),
            KoRule::Situational => !self.history.iter().any(|&(h, p)| h == hash && p == next),
            KoRule::Simple => true,
        }
    }

    /// Every legal move for the side to move. Pass is always last.
    pub fn legal_moves(&self) -> Vec<Loc> {
        let mut legal: Vec<Loc> = self
            .board
            .points()
            .filter(|&loc| self.is_legal(loc))
            .collect();
        legal.push(Loc::Pass);
        legal
    }

    /// Play as the side to move, returning the new position.
    pub fn play(&self, loc: Loc) -> Result<Position, RulesError> {
        let mut next = self.clone();
        next.play_mut(loc)?;
        Ok(next)
    }

    pub fn play_mut(&mut self, loc: Loc) -> Result<(), RulesError> {
        self.play_as(self.next_player, loc)
    }

    /// Play a move for an explicit player. The opponent moves next.
    pub fn play_as(&mut self, player: Player, loc: Loc) -> Result<(), RulesError> {
        self.play_checked(player, loc, self.rules.multi_stone_suicide_legal)
    }

    /// Like [`play_as`](Self::play_as) but accepts multi-stone suicide
    /// whatever the rules say. Used to replay recorded games, which may
    /// come from a rule set that allows it.
    pub fn play_as_tolerating_suicide(&mut self, player: Player, loc: Loc) -> Result<(), RulesError> {
        self.play_checked(player, loc, true)
    }

    fn play_checked(&mut self, player: Player, loc: Loc, multi_stone_suicide_legal: bool) -> Result<(), RulesError> {
        if !self.is_legal_with(player, loc, multi_stone_suicide_legal) {
            return Err(RulesError::IllegalMove {
                loc: loc.to_gtp(self.board.x_size(), self.board.y_size()),
                player,
            });
        }
        self.board.apply_move(loc, player);
        self.consecutive_passes = if loc.is_pass() {
            self.consecutive_passes + 1
        } else {
            0
        };
        self.moves.push(Move::new(player, loc));
        self.next_player = player.opponent();
        self.history.push((self.board.hash(), self.next_player));
        Ok(())
    }

    /// Final score from white's perspective, including komi.
    pub fn final_score_white(&self) -> f32 {
        self.board.area_score_white() + self.rules.komi
    }

    /// Winner under area scoring, or `None` for a draw.
    pub fn winner(&self) -> Option<Player> {
        let score = self.final_score_white();
        if score > 0.0 {
            Some(Player::White)
        } else if score < 0.0 {
            Some(Player::Black)
        } else {
            None
        }
    }

    /// Number of handicap stones black received.
    ///
    /// Setup stones count only when white has none on the initial board.
    /// With `count_leading_black_moves`, black moves played before white's
    /// first move are treated as handicap placements too.
    pub fn handicap_stones(&self, count_leading_black_moves: bool) -> u32 {
        let black = self.initial_board.count_stones(Player::Black) as u32;
        let white = self.initial_board.count_stones(Player::White);
        let mut stones = if white == 0 { black } else { 0 };

        if count_leading_black_moves && white == 0 {
            let leading = self
                .moves
                .iter()
                .take_while(|m| m.player == Player::Black)
                .filter(|m| !m.loc.is_pass())
                .count() as u32;
            if leading > 1 {
                stones += leading;
            }
        }
        stones
    }
}
