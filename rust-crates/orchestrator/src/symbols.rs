use rand::Rng;
use std::fmt;

/// Reel symbols in contract code order: the code emitted on-chain is the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Cherry,
    Lemon,
    Orange,
    Grape,
    Bell,
    MoneyBag,
    Target,
    Diamond,
}

pub const ALL_SYMBOLS: [Symbol; 8] = [
    Symbol::Cherry,
    Symbol::Lemon,
    Symbol::Orange,
    Symbol::Grape,
    Symbol::Bell,
    Symbol::MoneyBag,
    Symbol::Target,
    Symbol::Diamond,
];

impl Symbol {
    pub fn from_code(code: u8) -> Option<Self> {
        ALL_SYMBOLS.get(usize::from(code)).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Symbol::Cherry => "🍒",
            Symbol::Lemon => "🍋",
            Symbol::Orange => "🍊",
            Symbol::Grape => "🍇",
            Symbol::Bell => "🔔",
            Symbol::MoneyBag => "💰",
            Symbol::Target => "🎯",
            Symbol::Diamond => "💎",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Symbol::Cherry => "Cherry",
            Symbol::Lemon => "Lemon",
            Symbol::Orange => "Orange",
            Symbol::Grape => "Grape",
            Symbol::Bell => "Bell",
            Symbol::MoneyBag => "Money bag",
            Symbol::Target => "Target",
            Symbol::Diamond => "Diamond",
        }
    }

    /// Payout for three of a kind, in percent of the wager.
    pub fn payout_percent(self) -> u32 {
        match self {
            Symbol::Cherry => 150,
            Symbol::Lemon => 200,
            Symbol::Orange => 300,
            Symbol::Grape => 500,
            Symbol::Bell => 800,
            Symbol::MoneyBag => 1_200,
            Symbol::Target => 2_000,
            Symbol::Diamond => 5_000,
        }
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        ALL_SYMBOLS[rng.random_range(0..ALL_SYMBOLS.len())]
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

pub fn random_reels(rng: &mut impl Rng) -> [Symbol; 3] {
    [Symbol::random(rng), Symbol::random(rng), Symbol::random(rng)]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn from_code__maps_every_index_and_rejects_the_rest() {
        for (code, symbol) in ALL_SYMBOLS.iter().enumerate() {
            assert_eq!(Symbol::from_code(code as u8), Some(*symbol));
            assert_eq!(symbol.code() as usize, code);
        }
        assert_eq!(Symbol::from_code(8), None);
        assert_eq!(Symbol::from_code(u8::MAX), None);
    }
}
