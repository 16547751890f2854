use anyhow::{Context, Result, bail};
use std::collections::HashSet;

/// Largest seed range a single `a..b` token may expand to.
const MAX_RANGE: u64 = 10_000;
const DEFAULT_SEED: u64 = 1337;

/// A seed plus the token that produced it, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInfo {
    pub seed: u64,
    pub source: String,
}

impl SeedInfo {
    #[must_use]
    pub fn from_numeric(seed: u64) -> Self {
        Self {
            seed,
            source: seed.to_string(),
        }
    }
}

/// Resolve CLI seed tokens.
///
/// Supports decimal integers (negative values use their magnitude), `0x`
/// hexadecimal, and half-open ranges such as `10..20`.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<SeedInfo>> {
    let mut pending: Vec<SeedInfo> = Vec::new();

    for token in tokens {
        if token.is_empty() {
            continue;
        }

        if let Some((start, end)) = token.split_once("..") {
            let start = parse_single(start)?;
            let end = parse_single(end)?;
            if end <= start {
                bail!("Empty seed range: {token}");
            }
            if end - start > MAX_RANGE {
                bail!("Seed range {token} is wider than {MAX_RANGE}");
            }
            pending.extend((start..end).map(|seed| SeedInfo {
                seed,
                source: token.clone(),
            }));
            continue;
        }

        let seed = parse_single(token)?;
        pending.push(SeedInfo {
            seed,
            source: token.clone(),
        });
    }

    let mut seen = HashSet::new();
    pending.retain(|info| seen.insert(info.seed));

    if pending.is_empty() {
        pending.push(SeedInfo::from_numeric(DEFAULT_SEED));
    }

    Ok(pending)
}

fn parse_single(token: &str) -> Result<u64> {
    let token = token.trim();
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .with_context(|| format!("Unrecognized seed token: {token}"));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value.unsigned_abs());
    }
    token
        .parse::<u64>()
        .with_context(|| format!("Unrecognized seed token: {token}"))
}
