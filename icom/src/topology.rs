//! Topology strings: range/list expansion and field splitting.
//!
//! A topology is a comma-separated list of segments. A segment is either a
//! literal endpoint or `prefix[items]suffix`, where `items` is itself a
//! comma-separated list of numbers and inclusive `low-high` ranges:
//!
//! ```text
//!   "127.0.0.1:[8000-8002]"     -> 127.0.0.1:8000, 127.0.0.1:8001, 127.0.0.1:8002
//!   "h:[1,3-4],*:9"             -> h:1, h:3, h:4, *:9
//!   "/tmp/q[5].fifo"            -> /tmp/q5.fifo
//! ```
//!
//! Nothing is trimmed: whitespace belongs to the token it sits in.

use crate::error::{IcomError, Result};
use crate::flags::FlagSet;
use crate::kind::TransportKind;

/// Field separator of a composite specification.
pub const SPEC_DELIMITER: char = '|';

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Expand a topology into its ordered list of endpoints.
///
/// Fails as a whole on the first malformed segment; no partial list is ever
/// returned.
pub fn expand(spec: &str) -> Result<Vec<String>> {
    if spec.is_empty() {
        return Err(invalid("empty topology"));
    }

    let segments = split_top_level(spec)?;
    let mut parsed = Vec::with_capacity(segments.len());
    let mut total: usize = 0;
    for segment in &segments {
        let seg = Segment::parse(segment)?;
        total = total.checked_add(seg.count()?).ok_or(IcomError::OutOfMemory)?;
        parsed.push(seg);
    }

    let mut out = Vec::new();
    out.try_reserve_exact(total)?;
    for seg in parsed {
        seg.expand_into(&mut out);
    }
    log::debug!("topology {spec:?} expanded to {} endpoint(s)", out.len());
    Ok(out)
}

/// Split on commas that are not inside brackets.
fn split_top_level(spec: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut in_bracket = false;
    let mut start = 0;

    for (i, c) in spec.char_indices() {
        match c {
            '[' if in_bracket => return Err(invalid("nested '[' in topology")),
            '[' => in_bracket = true,
            ']' if !in_bracket => return Err(invalid("unmatched ']' in topology")),
            ']' => in_bracket = false,
            ',' if !in_bracket => {
                segments.push(&spec[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_bracket {
        return Err(invalid("unterminated '[' in topology"));
    }
    segments.push(&spec[start..]);

    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty segment in topology"));
    }
    Ok(segments)
}

/// One top-level segment, already validated.
enum Segment<'a> {
    Literal(&'a str),
    Ranged {
        prefix: &'a str,
        suffix: &'a str,
        ranges: Vec<(u64, u64)>,
    },
}

impl<'a> Segment<'a> {
    fn parse(segment: &'a str) -> Result<Self> {
        // Bracket balance was checked by `split_top_level`.
        let Some(open) = segment.find('[') else {
            return Ok(Segment::Literal(segment));
        };
        let close = segment[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| invalid("unterminated '[' in topology"))?;
        let suffix = &segment[close + 1..];
        if suffix.contains('[') {
            return Err(invalid("more than one bracket group in segment"));
        }

        let ranges = segment[open + 1..close]
            .split(',')
            .map(parse_item)
            .collect::<Result<Vec<_>>>()?;

        Ok(Segment::Ranged {
            prefix: &segment[..open],
            suffix,
            ranges,
        })
    }

    fn count(&self) -> Result<usize> {
        match self {
            Segment::Literal(_) => Ok(1),
            Segment::Ranged { ranges, .. } => ranges.iter().try_fold(0usize, |acc, (lo, hi)| {
                let n = usize::try_from(hi - lo)
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or(IcomError::OutOfMemory)?;
                acc.checked_add(n).ok_or(IcomError::OutOfMemory)
            }),
        }
    }

    fn expand_into(self, out: &mut Vec<String>) {
        match self {
            Segment::Literal(s) => out.push(s.to_string()),
            Segment::Ranged {
                prefix,
                suffix,
                ranges,
            } => {
                for (lo, hi) in ranges {
                    out.extend((lo..=hi).map(|n| format!("{prefix}{n}{suffix}")));
                }
            }
        }
    }
}

/// `n` or `low-high`, digits only.
fn parse_item(item: &str) -> Result<(u64, u64)> {
    match item.split_once('-') {
        Some((lo, hi)) => {
            let (lo, hi) = (parse_number(lo)?, parse_number(hi)?);
            if lo > hi {
                return Err(invalid(format!("descending range {item:?}")));
            }
            Ok((lo, hi))
        }
        None => {
            let n = parse_number(item)?;
            Ok((n, n))
        }
    }
}

fn parse_number(s: &str) -> Result<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("non-numeric range item {s:?}")));
    }
    s.parse()
        .map_err(|_| invalid(format!("range item {s:?} out of bounds")))
}

fn invalid(msg: impl Into<String>) -> IcomError {
    IcomError::InvalidArgument(msg.into())
}

// ---------------------------------------------------------------------------
// Field splitting
// ---------------------------------------------------------------------------

/// Split `spec` into exactly `count(delimiter) + 1` fields.
///
/// Empty fields are kept; only an empty input is rejected.
pub fn split_fields(spec: &str, delimiter: char) -> Result<Vec<String>> {
    if spec.is_empty() {
        return Err(invalid("empty specification"));
    }
    Ok(spec.split(delimiter).map(str::to_string).collect())
}

/// A decoded `"type|flags|topology"` specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeSpec {
    pub kind: TransportKind,
    pub flags: FlagSet,
    pub endpoints: Vec<String>,
}

impl CompositeSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let fields = split_fields(spec, SPEC_DELIMITER)?;
        let [kind, flags, topology] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected \"type|flags|topology\", got {} field(s)",
                fields.len()
            )));
        };

        Ok(CompositeSpec {
            kind: kind.parse()?,
            flags: flags.parse()?,
            endpoints: expand(topology)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // expand
    // -----------------------------------------------------------------------

    #[test]
    fn literals_and_ranges_combine() {
        assert_eq!(expand("a,b").unwrap(), strs(&["a", "b"]));
        assert_eq!(expand("a[0-2]").unwrap(), strs(&["a0", "a1", "a2"]));
        assert_eq!(expand("a[0-1],b").unwrap(), strs(&["a0", "a1", "b"]));
    }

    #[test]
    fn literal_passes_through() {
        assert_eq!(expand("127.0.0.1:8889").unwrap(), strs(&["127.0.0.1:8889"]));
    }

    #[test]
    fn inclusive_range_expands_in_order() {
        assert_eq!(
            expand("127.0.0.1:[8000-8002]").unwrap(),
            strs(&["127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002"])
        );
    }

    #[test]
    fn list_and_ranges_mix_inside_brackets() {
        assert_eq!(
            expand("h:[1,3-4],*:9").unwrap(),
            strs(&["h:1", "h:3", "h:4", "*:9"])
        );
    }

    #[test]
    fn single_item_bracket_degenerates() {
        assert_eq!(expand("/tmp/q[5].fifo").unwrap(), strs(&["/tmp/q5.fifo"]));
        assert_eq!(expand("p:[7-7]").unwrap(), strs(&["p:7"]));
    }

    #[test]
    fn written_order_is_kept() {
        assert_eq!(expand("a[3,1,2]").unwrap(), strs(&["a3", "a1", "a2"]));
    }

    #[test]
    fn malformed_topologies_fail_whole() {
        for bad in [
            "",
            "a,,b",
            "a,",
            "a[1-3",
            "a[1[2]]",
            "a]1",
            "a[]",
            "a[1,]",
            "a[x]",
            "a[ 1]",
            "a[3-1]",
            "a[1-]",
            "a[1][2]",
        ] {
            assert!(
                matches!(expand(bad), Err(IcomError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn impossible_expansion_is_out_of_memory() {
        let spec = format!("a[0-{}]", u64::MAX);
        assert!(matches!(expand(&spec), Err(IcomError::OutOfMemory)));
    }

    // -----------------------------------------------------------------------
    // split_fields / CompositeSpec
    // -----------------------------------------------------------------------

    #[test]
    fn split_counts_delimiters_plus_one() {
        assert_eq!(split_fields("a|b|c", '|').unwrap(), strs(&["a", "b", "c"]));
        assert_eq!(split_fields("a||", '|').unwrap(), strs(&["a", "", ""]));
        assert_eq!(split_fields("abc", '|').unwrap(), strs(&["abc"]));
        assert!(matches!(
            split_fields("", '|'),
            Err(IcomError::InvalidArgument(_))
        ));
    }

    #[test]
    fn composite_spec_decodes_all_three_fields() {
        let spec = CompositeSpec::parse("socket_rx|zero,timeout|*:[9000-9001]").unwrap();
        assert_eq!(spec.kind, TransportKind::SocketBind);
        assert_eq!(spec.flags, FlagSet::ZERO_COPY | FlagSet::TIMEOUT);
        assert_eq!(spec.endpoints, strs(&["*:9000", "*:9001"]));
    }

    #[test]
    fn composite_spec_needs_three_fields() {
        assert!(matches!(
            CompositeSpec::parse("socket_tx|default"),
            Err(IcomError::InvalidArgument(_))
        ));
        assert!(matches!(
            CompositeSpec::parse("socket_tx|default|a|b"),
            Err(IcomError::InvalidArgument(_))
        ));
    }

    #[test]
    fn composite_spec_reports_unknown_tokens() {
        assert!(matches!(
            CompositeSpec::parse("udp|default|a:1"),
            Err(IcomError::Lookup(_))
        ));
        assert!(matches!(
            CompositeSpec::parse("socket_tx|fast|a:1"),
            Err(IcomError::Lookup(_))
        ));
    }
}
