use super::manifest::{Stability, ToolRecord};
use std::cmp::Ordering;

pub fn parse_semver(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let mut next = || {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse::<u64>().ok()
    };
    let triplet = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(triplet)
}

fn stability_rank(stability: Stability) -> u8 {
    match stability {
        Stability::Stable => 1,
        Stability::Experimental => 0,
    }
}

fn rank(left: &ToolRecord, right: &ToolRecord) -> Ordering {
    stability_rank(left.stability)
        .cmp(&stability_rank(right.stability))
        .then_with(|| parse_semver(&left.version).cmp(&parse_semver(&right.version)))
        .then_with(|| left.name.cmp(&right.name))
}

pub fn pick_best_tool<'a, I>(candidates: I) -> Option<&'a ToolRecord>
where
    I: IntoIterator<Item = &'a ToolRecord>,
{
    candidates.into_iter().max_by(|left, right| rank(left, right))
}
