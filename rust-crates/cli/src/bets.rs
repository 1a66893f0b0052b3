use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::{
    types::U256,
    utils::{
        format_units,
        parse_units,
    },
};
use wager_orchestrator::symbols::ALL_SYMBOLS;

/// Wager sizes the game contract accepts, in whole tokens.
pub const BET_TIERS: [u64; 7] = [
    30_000, 50_000, 100_000, 300_000, 500_000, 800_000, 1_000_000,
];

pub fn validate_tier(tokens: u64) -> Result<u64> {
    if BET_TIERS.contains(&tokens) {
        Ok(tokens)
    } else {
        Err(eyre!(
            "{tokens} is not a bet tier; choose one of {}",
            tier_list()
        ))
    }
}

pub fn tier_list() -> String {
    BET_TIERS
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn to_base_units(tokens: u64, decimals: u32) -> Result<U256> {
    let units = parse_units(tokens, decimals)
        .wrap_err_with(|| format!("{tokens} tokens do not fit {decimals} decimals"))?;
    Ok(units.into())
}

/// Whole-token rendering with trailing zeros trimmed.
pub fn format_amount(amount: U256, decimals: u32) -> String {
    let Ok(formatted) = format_units(amount, decimals) else {
        return amount.to_string();
    };
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    }
}

pub fn payout_table() -> String {
    let mut table = String::from("Three of a kind pays:\n");
    for symbol in ALL_SYMBOLS {
        let percent = symbol.payout_percent();
        table.push_str(&format!(
            "  {glyph} {glyph} {glyph}  {name:<9} x{whole}.{frac:02}\n",
            glyph = symbol.glyph(),
            name = symbol.name(),
            whole = percent / 100,
            frac = percent % 100,
        ));
    }
    table
}
