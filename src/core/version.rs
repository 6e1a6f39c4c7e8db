//! Version algebra (C3): semver-like total ordering and constraint
//! satisfaction.  `virtual` is a sentinel that satisfies any constraint.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex_lite::Regex;


/// Sentinel version string for a package satisfied only by a capability
/// provider, never an installed concrete package.
pub(crate) const VIRTUAL: &str = "virtual";


#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Version
{
	raw: String,
	main: Vec<u64>,
	pre: Vec<String>,
	// build metadata is parsed (so round-tripping Display is faithful)
	// but never compared, per spec.
	build: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum VersionErr
{
	#[error("invalid version: {0}")]
	InvalidVersion(String),
}


fn version_re() -> &'static Regex
{
	use std::sync::OnceLock;
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"^[0-9]+(\.[0-9]+)*(-[0-9A-Za-z.]+)?(\+[0-9A-Za-z.]+)?$").unwrap()
	})
}


impl FromStr for Version
{
	type Err = VersionErr;

	fn from_str(s: &str) -> Result<Self, Self::Err>
	{
		if s == VIRTUAL
		{
			return Ok(Version {
				raw: s.to_string(),
				main: Vec::new(),
				pre: Vec::new(),
				build: Vec::new(),
			});
		}

		if !version_re().is_match(s)
		{
			return Err(VersionErr::InvalidVersion(s.to_string()));
		}

		// Split off build, then pre, then main, in that order since
		// '+' always comes after '-' in the grammar.
		let (rest, build) = match s.split_once('+')
		{
			Some((a, b)) => (a, b.split('.').map(str::to_string).collect()),
			None => (s, Vec::new()),
		};
		let (mainstr, pre) = match rest.split_once('-')
		{
			Some((a, b)) => (a, b.split('.').map(str::to_string).collect()),
			None => (rest, Vec::new()),
		};

		let main: Vec<u64> = mainstr.split('.')
				.map(|p| p.parse::<u64>().map_err(|_| VersionErr::InvalidVersion(s.to_string())))
				.collect::<Result<_, _>>()?;

		Ok(Version { raw: s.to_string(), main, pre, build })
	}
}

impl fmt::Display for Version
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		write!(f, "{}", self.raw)
	}
}


impl Version
{
	pub(crate) fn is_virtual(&self) -> bool { self.raw == VIRTUAL }

	/// A total order per spec.md §4.3: main parts padded and compared
	/// numerically; a present PRE makes a version smaller than the bare
	/// MAIN; shared PRE's compare identifier-by-identifier.  BUILD is
	/// ignored.
	pub(crate) fn compare(&self, other: &Self) -> Ordering
	{
		let len = self.main.len().max(other.main.len());
		for i in 0..len
		{
			let a = self.main.get(i).copied().unwrap_or(0);
			let b = other.main.get(i).copied().unwrap_or(0);
			match a.cmp(&b)
			{
				Ordering::Equal => continue,
				ord => return ord,
			}
		}

		match (self.pre.is_empty(), other.pre.is_empty())
		{
			(true, true) => Ordering::Equal,
			(false, true) => Ordering::Less,
			(true, false) => Ordering::Greater,
			(false, false) => compare_pre(&self.pre, &other.pre),
		}
	}
}

fn compare_pre(a: &[String], b: &[String]) -> Ordering
{
	for (ai, bi) in a.iter().zip(b.iter())
	{
		let ord = compare_pre_part(ai, bi);
		if ord != Ordering::Equal { return ord; }
	}
	a.len().cmp(&b.len())
}

fn compare_pre_part(a: &str, b: &str) -> Ordering
{
	let an: Option<u64> = a.parse().ok();
	let bn: Option<u64> = b.parse().ok();
	match (an, bn)
	{
		(Some(an), Some(bn)) => an.cmp(&bn),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => a.cmp(b),
	}
}

impl PartialOrd for Version
{
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.compare(other)) }
}
impl Ord for Version
{
	fn cmp(&self, other: &Self) -> Ordering { self.compare(other) }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op { Eq, Ne, Lt, Le, Gt, Ge }

impl FromStr for Op
{
	type Err = VersionErr;

	fn from_str(s: &str) -> Result<Self, Self::Err>
	{
		Ok(match s
		{
			"=" | "==" => Op::Eq,
			"!=" => Op::Ne,
			"<" => Op::Lt,
			"<=" => Op::Le,
			">" => Op::Gt,
			">=" => Op::Ge,
			_ => return Err(VersionErr::InvalidVersion(format!("bad operator '{s}'"))),
		})
	}
}

impl fmt::Display for Op
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		f.write_str(match self {
			Op::Eq => "==", Op::Ne => "!=",
			Op::Lt => "<", Op::Le => "<=",
			Op::Gt => ">", Op::Ge => ">=",
		})
	}
}


/// `satisfies(v, op, req)`: the `virtual` sentinel always satisfies.
pub(crate) fn satisfies(v: &Version, op: Op, req: &Version) -> bool
{
	if v.is_virtual() { return true; }

	let ord = v.compare(req);
	match op
	{
		Op::Eq => ord == Ordering::Equal,
		Op::Ne => ord != Ordering::Equal,
		Op::Lt => ord == Ordering::Less,
		Op::Le => ord != Ordering::Greater,
		Op::Gt => ord == Ordering::Greater,
		Op::Ge => ord != Ordering::Less,
	}
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn v(s: &str) -> Version { s.parse().unwrap() }

	#[test]
	fn pre_release_smaller_than_bare()
	{
		assert_eq!(v("1.0-alpha").compare(&v("1.0")), Ordering::Less);
	}

	#[test]
	fn patch_orders_above_base()
	{
		assert_eq!(v("1.0").compare(&v("1.0.1")), Ordering::Less);
	}

	#[test]
	fn numeric_pre_orders_before_non_numeric()
	{
		assert_eq!(v("1.0-1").compare(&v("1.0-alpha")), Ordering::Less);
	}

	#[test]
	fn numeric_pre_identifiers_order_numerically()
	{
		assert_eq!(v("1.0-2").compare(&v("1.0-10")), Ordering::Less);
	}

	#[test]
	fn virtual_satisfies_anything()
	{
		let virt = v("virtual");
		assert!(satisfies(&virt, Op::Eq, &v("9.9")));
		assert!(satisfies(&virt, Op::Lt, &v("0.0")));
	}

	#[test]
	fn rejects_garbage()
	{
		assert!("not-a-version!!".parse::<Version>().is_err());
	}

	#[test]
	fn build_metadata_ignored_in_compare()
	{
		assert_eq!(v("1.0+abc").compare(&v("1.0+xyz")), Ordering::Equal);
	}
}
