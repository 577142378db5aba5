// src/package.rs

//! Package records as reported by the native package database
//!
//! A `Package` is immutable once built. Queries hand out `Arc<Package>`
//! references into the shared `PackageIndex`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Repository id of the local install database
pub const SYSTEM_REPO_ID: &str = "@System";

/// Identity of a package: name, epoch, version, release and architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl PackageId {
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            epoch: 0,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
        }
    }

    /// `(name, arch)` pair used to line up installed and available builds
    pub fn name_arch(&self) -> (&str, &str) {
        (&self.name, &self.arch)
    }

    /// Compare epoch, version and release (segment-wise, numeric aware)
    pub fn evr_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segments(&self.version, &other.version))
            .then_with(|| compare_segments(&self.release, &other.release))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(
                f,
                "{}-{}:{}-{}.{}",
                self.name, self.epoch, self.version, self.release, self.arch
            )
        } else {
            write!(
                f,
                "{}-{}-{}.{}",
                self.name, self.version, self.release, self.arch
            )
        }
    }
}

/// Compare two version strings the way rpmvercmp does
///
/// Alternating runs of digits and letters are compared pairwise, numbers
/// numerically and numeric runs newer than alphabetic ones. Other
/// characters only separate runs, except `~`, which sorts before anything
/// (even the end of the string), and `^`, which sorts after the end of the
/// string but before any further run.
fn compare_segments(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    if a == b {
        return Ordering::Equal;
    }

    let is_sep = |c: u8| !c.is_ascii_alphanumeric() && c != b'~' && c != b'^';
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    loop {
        while i < a.len() && is_sep(a[i]) {
            i += 1;
        }
        while j < b.len() && is_sep(b[j]) {
            j += 1;
        }

        let (a_tilde, b_tilde) = (a.get(i) == Some(&b'~'), b.get(j) == Some(&b'~'));
        if a_tilde || b_tilde {
            if !a_tilde {
                return Ordering::Greater;
            }
            if !b_tilde {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        let (a_caret, b_caret) = (a.get(i) == Some(&b'^'), b.get(j) == Some(&b'^'));
        if a_caret || b_caret {
            if i == a.len() {
                return Ordering::Less;
            }
            if j == b.len() {
                return Ordering::Greater;
            }
            if !a_caret {
                return Ordering::Greater;
            }
            if !b_caret {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i == a.len() || j == b.len() {
            break;
        }

        let numeric = a[i].is_ascii_digit();
        let in_run = |c: &u8| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        };
        let a_end = i + a[i..].iter().take_while(|c| in_run(c)).count();
        let b_end = j + b[j..].iter().take_while(|c| in_run(c)).count();
        let (x, y) = (&a[i..a_end], &b[j..b_end]);

        // b has a run of the other kind here
        if y.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let trim = |s: &[u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
            let (x, y) = (&x[trim(x)..], &y[trim(y)..]);
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        } else {
            x.cmp(y)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        i = a_end;
        j = b_end;
    }

    // whichever string has runs left over is newer
    match (i == a.len(), j == b.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, _) => Ordering::Greater,
    }
}

/// Digest algorithm of a package checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumType {
    pub fn as_str(&self) -> &str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha384 => "sha384",
            ChecksumType::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumType::Md5 => 16,
            ChecksumType::Sha1 => 20,
            ChecksumType::Sha256 => 32,
            ChecksumType::Sha384 => 48,
            ChecksumType::Sha512 => 64,
        }
    }
}

impl FromStr for ChecksumType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "md5" => Ok(ChecksumType::Md5),
            "sha1" | "sha" => Ok(ChecksumType::Sha1),
            "sha256" => Ok(ChecksumType::Sha256),
            "sha384" => Ok(ChecksumType::Sha384),
            "sha512" => Ok(ChecksumType::Sha512),
            _ => Err(format!("Invalid checksum type: {}", s)),
        }
    }
}

/// Checksum tuple: algorithm plus raw digest bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub kind: ChecksumType,
    pub digest: Vec<u8>,
}

impl Checksum {
    pub fn new(kind: ChecksumType, digest: Vec<u8>) -> Self {
        Self { kind, digest }
    }

    /// Build a checksum from a hex-encoded digest
    pub fn from_hex(kind: ChecksumType, hex: &str) -> Result<Self> {
        if !hex.is_ascii() || hex.len() != kind.digest_len() * 2 {
            return Err(Error::ParseError(format!(
                "{} digest must be {} hex characters, got {}",
                kind.as_str(),
                kind.digest_len() * 2,
                hex.len()
            )));
        }

        let digest = (0..hex.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|e| Error::ParseError(format!("Invalid hex digest '{}': {}", hex, e)))
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Self { kind, digest })
    }

    /// Digest rendered as lowercase hex
    pub fn hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// A package known to the package database, installed or available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub summary: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub checksum: Option<Checksum>,
    /// Origin repository id; installed packages report `@System`
    pub repo: String,
    pub installed: bool,
}

impl Package {
    /// An available package from `repo`
    pub fn available(id: PackageId, repo: &str) -> Self {
        Self {
            id,
            summary: String::new(),
            description: None,
            url: None,
            checksum: None,
            repo: repo.to_string(),
            installed: false,
        }
    }

    /// A package present in the local install database
    pub fn installed(id: PackageId) -> Self {
        Self {
            installed: true,
            ..Self::available(id, SYSTEM_REPO_ID)
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn arch(&self) -> &str {
        &self.id.arch
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_package_id_display() {
        let id = PackageId::new("pepper", "20", "0", "x86_64");
        assert_eq!(id.to_string(), "pepper-20-0.x86_64");

        let mut epoch = id.clone();
        epoch.epoch = 2;
        assert_eq!(epoch.to_string(), "pepper-2:20-0.x86_64");
    }

    #[test]
    fn test_evr_compare() {
        let a = PackageId::new("foo", "1.10", "1", "noarch");
        let b = PackageId::new("foo", "1.9", "1", "noarch");
        assert_eq!(a.evr_cmp(&b), Ordering::Greater);

        let c = PackageId::new("foo", "1.0", "1.fc38", "noarch");
        let d = PackageId::new("foo", "1.0", "1.fc38", "noarch");
        assert_eq!(c.evr_cmp(&d), Ordering::Equal);

        let e = PackageId::new("foo", "1.0a", "1", "noarch");
        let f = PackageId::new("foo", "1.0", "1", "noarch");
        assert_eq!(e.evr_cmp(&f), Ordering::Greater);

        let mut g = PackageId::new("foo", "0.1", "1", "noarch");
        g.epoch = 1;
        assert_eq!(g.evr_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn test_evr_compare_tilde_and_caret() {
        let cmp = |x: &str, y: &str| {
            PackageId::new("foo", x, "1", "noarch").evr_cmp(&PackageId::new("foo", y, "1", "noarch"))
        };

        // pre-releases sort before the release
        assert_eq!(cmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0", "1.0~rc1"), Ordering::Greater);
        assert_eq!(cmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(cmp("1.0~~", "1.0~"), Ordering::Less);

        // snapshots sort after the base version but before the next one
        assert_eq!(cmp("1.0^git1", "1.0"), Ordering::Greater);
        assert_eq!(cmp("1.0^git1", "1.0.1"), Ordering::Less);
        assert_eq!(cmp("1.0^git1", "1.0^git2"), Ordering::Less);
        assert_eq!(cmp("1.0~rc1^git1", "1.0~rc1"), Ordering::Greater);

        assert_eq!(cmp("1.0~rc1", "1.0~rc1"), Ordering::Equal);
        assert_eq!(cmp("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_checksum_hex_roundtrip() {
        let hex = "68e9ded8ea25137c964a638f12e9987c";
        let sum = Checksum::from_hex(ChecksumType::Md5, hex).unwrap();
        assert_eq!(sum.digest.len(), 16);
        assert_eq!(sum.hex(), hex);

        let upper = Checksum::from_hex(ChecksumType::Md5, &hex.to_uppercase()).unwrap();
        assert_eq!(upper.hex(), hex);
    }

    #[test]
    fn test_checksum_rejects_bad_digest() {
        assert!(Checksum::from_hex(ChecksumType::Md5, "abc").is_err());
        assert!(Checksum::from_hex(ChecksumType::Md5, &"zz".repeat(16)).is_err());
    }

    #[test]
    fn test_checksum_type_parse() {
        assert_eq!("md5".parse::<ChecksumType>().unwrap(), ChecksumType::Md5);
        assert_eq!("sha".parse::<ChecksumType>().unwrap(), ChecksumType::Sha1);
        assert!("crc32".parse::<ChecksumType>().is_err());
    }
}
