use serde::Serialize;

/// One reviewable unit: a change, one of its patch sets, and the server that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewTarget {
    pub change: u64,
    pub patch_set: u32,
    pub host: String,
}

impl ReviewTarget {
    pub fn new(change: u64, patch_set: u32, host: impl Into<String>) -> Self {
        Self {
            change,
            patch_set,
            host: host.into(),
        }
    }
}

/// Targets plus the review arguments applied identically to each of them.
///
/// Order only matters for session reuse: consecutive targets on the same host
/// share one connection.
#[derive(Debug, Clone)]
pub struct ReviewBatch {
    pub targets: Vec<ReviewTarget>,
    pub args: String,
}

impl ReviewBatch {
    pub fn new(targets: Vec<ReviewTarget>, args: impl Into<String>) -> Self {
        Self {
            targets,
            args: args.into(),
        }
    }

    pub fn single(target: ReviewTarget, args: impl Into<String>) -> Self {
        Self::new(vec![target], args)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("target '{0}' has no host and no default host was given")]
    MissingHost(String),

    #[error("target '{0}' must look like CHANGE,PATCHSET")]
    Malformed(String),

    #[error("invalid {field} '{value}' in target '{target}'")]
    InvalidNumber {
        target: String,
        field: &'static str,
        value: String,
    },
}

/// Hostnames compare ASCII case-insensitively.
pub fn same_host(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Parse `HOST:CHANGE,PATCHSET` or `CHANGE,PATCHSET`.
///
/// The short form takes its host from `default_host`.
pub fn parse_target(
    raw: &str,
    default_host: Option<&str>,
) -> Result<ReviewTarget, TargetParseError> {
    let raw = raw.trim();
    let (host, numbers) = match raw.rsplit_once(':') {
        Some((host, numbers)) if !host.is_empty() => (host, numbers),
        Some(_) => return Err(TargetParseError::MissingHost(raw.to_string())),
        None => {
            let host = default_host
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| TargetParseError::MissingHost(raw.to_string()))?;
            (host, raw)
        }
    };

    let (change, patch_set) = numbers
        .split_once(',')
        .ok_or_else(|| TargetParseError::Malformed(raw.to_string()))?;

    let change = parse_number::<u64>(raw, "change number", change)?;
    let patch_set = parse_number::<u32>(raw, "patch set", patch_set)?;

    Ok(ReviewTarget::new(change, patch_set, host.trim()))
}

fn parse_number<T>(target: &str, field: &'static str, value: &str) -> Result<T, TargetParseError>
where
    T: std::str::FromStr + PartialEq + From<u8>,
{
    let invalid = || TargetParseError::InvalidNumber {
        target: target.to_string(),
        field,
        value: value.to_string(),
    };
    let parsed: T = value.trim().parse().map_err(|_| invalid())?;
    // Gerrit numbers changes and patch sets from 1
    if parsed == T::from(0) {
        return Err(invalid());
    }
    Ok(parsed)
}
