use crate::error::MigrationError;
use anyhow::Result;

/// A version parsed from a workspace directory name.
///
/// Grammar: `v<major>[.<minor>[.<revision>]][<label>]` where the label starts
/// with `-` or `.` and is not purely numeric. Leading zeros are accepted and
/// normalized numerically, so `v01` and `v1.0` both canonicalize to `v1.00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
    pub label: String,
    /// The directory name exactly as found on disk
    pub name: String,
}

impl LocalVersion {
    pub fn parse(name: &str) -> Result<Self> {
        let rest = name.strip_prefix('v').ok_or_else(|| invalid(name))?;
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid(name).into());
        }

        let (major, rest) = take_number(rest);
        let (minor, rest) = take_dot_number(rest);
        let (revision, rest) = take_dot_number(rest);

        let label = match rest {
            "" => String::new(),
            label if is_valid_label(label) => label.to_string(),
            _ => return Err(invalid(name).into()),
        };

        Ok(Self {
            major,
            minor: minor.unwrap_or(0),
            revision: revision.unwrap_or(0),
            label,
            name: name.to_string(),
        })
    }

    /// Canonical version string: `v{major}.{minor:02}{label}`.
    ///
    /// The revision is deliberately excluded; it is carried on the value but
    /// does not participate in the canonical identity.
    pub fn sem_version(&self) -> String {
        format!("v{}.{:02}{}", self.major, self.minor, self.label)
    }

    /// Ordering key for resolution and directory sequencing. Only
    /// `(major, minor)` take part; directories sharing a key keep their
    /// traversal order (stable sort).
    pub fn sequence_key(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl std::fmt::Display for LocalVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sem_version())
    }
}

fn invalid(name: &str) -> MigrationError {
    MigrationError::Naming(format!(
        "'{}' is not a valid version directory name; expected v<major>[.<minor>[.<revision>]][<label>] such as v1.00 or v2.01-hotfix",
        name
    ))
}

/// Consume a leading run of digits, returning the parsed value and the rest.
/// Saturates rather than failing on absurdly long digit runs.
fn take_number(input: &str) -> (u32, &str) {
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let value = input[..split].parse::<u64>().unwrap_or(u64::MAX);
    (value.min(u32::MAX as u64) as u32, &input[split..])
}

/// Consume `.<digits>` if present. A dot not followed by a digit is left for
/// the label rule to judge.
fn take_dot_number(input: &str) -> (Option<u32>, &str) {
    if let Some(rest) = input.strip_prefix('.')
        && rest.starts_with(|c: char| c.is_ascii_digit())
    {
        let (value, rest) = take_number(rest);
        return (Some(value), rest);
    }
    (None, input)
}

/// A label starts with `-` or `.` and its remainder is non-empty and not
/// purely numeric (a purely numeric tail would be a fourth version segment,
/// which the grammar does not allow).
fn is_valid_label(label: &str) -> bool {
    let Some(body) = label.strip_prefix(['-', '.']) else {
        return false;
    };
    !body.is_empty() && !body.chars().all(|c| c.is_ascii_digit())
}
