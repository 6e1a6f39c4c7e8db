//! SHA256 hashing utils for verifying fetched archives.
use std::ops::Deref;
use std::fmt;


/// A raw SHA256 hash output.
///
/// SHA256 gives you a 256 bit number, which you need 256 bits to store.
/// Or more, depending on how you store it, but if you wanna be simple,
/// it's just 256 bits.  Or 32 octets.  The sha2 crate stores into a
/// [u8; 32], and base16ct can deal with that, so we just wrap that and
/// call it good.
#[derive(Default, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Sha256Hash([u8; 32]);

impl Deref for Sha256Hash
{
	type Target = [u8; 32];
	fn deref(&self) -> &Self::Target { &self.0 }
}

impl fmt::Debug for Sha256Hash
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{ write!(f, "Sha256Hash({})", self) }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HashParseErr
{
	#[error("invalid hash length: {0} should be 64 for '{1}'")]
	Length(usize, String),

	#[error("invalid hex: {0}")]
	Hex(String),
}

impl std::str::FromStr for Sha256Hash
{
	type Err = HashParseErr;

	fn from_str(s: &str) -> Result<Self, Self::Err>
	{
		let xlen = 64;
		if s.len() != xlen
		{
			return Err(HashParseErr::Length(s.len(), s.to_string()));
		}

		let mut hout = Sha256Hash::default();
		base16ct::lower::decode(s, &mut hout.0)
				.map_err(|e| HashParseErr::Hex(format!("{e} trying '{s}'")))?;

		Ok(hout)
	}
}

impl From<[u8; 32]> for Sha256Hash
{
	fn from(buf: [u8; 32]) -> Self { Self(buf) }
}

impl fmt::Display for Sha256Hash
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		// A hex encoding of 32 bytes is always 64 ASCII chars.
		let mut buf = [0u8; 64];
		let hex = base16ct::lower::encode_str(&self.0, &mut buf)
				.expect("32-byte buffer always hex-encodes into 64 bytes");
		write!(f, "{hex}")
	}
}



/// Check the SHA256 hash of a buffer against an expected result.
pub(crate) fn check_sha256(buf: &[u8], expect: &str, name: &str)
		-> Result<(), anyhow::Error>
{
	use sha2::{Sha256, Digest};

	let xhash: Sha256Hash = expect.parse()?;
	let khash = Sha256Hash(Sha256::digest(buf).into());

	if khash != xhash
	{
		anyhow::bail!("bad {name} hash: expected '{xhash}', got '{khash}'");
	}

	Ok(())
}


#[derive(Debug, thiserror::Error)]
pub(crate) enum Sha256ReaderErr
{
	#[error("I/O error: {0}")]
	IO(#[from] std::io::Error),

	#[error("invalid hash (expected {0}, got {1})")]
	Hash(String, String),

	#[error("invalid expected hash: {0}")]
	Expected(HashParseErr),
}


/// Calculate the SHA256 of something we can read from (a filehandle, a
/// stream out of the archive extractor, etc).
pub(crate) fn sha256_reader<T: std::io::Read>(rdr: &mut T)
		-> Result<Sha256Hash, Sha256ReaderErr>
{
	use sha2::{Sha256, Digest};

	let mut hasher = Sha256::new();
	std::io::copy(rdr, &mut hasher)?;
	Ok(Sha256Hash(hasher.finalize().into()))
}


/// Calculate the SHA256 of a file.
pub(crate) fn sha256_file(file: &std::path::Path)
		-> Result<Sha256Hash, Sha256ReaderErr>
{
	let mut fh = std::fs::File::open(file)?;
	sha256_reader(&mut fh)
}


/// Check the SHA256 of a file against an expected value.
pub(crate) fn check_sha256_file(file: &std::path::Path, expect: &str)
		-> Result<(), Sha256ReaderErr>
{
	use Sha256ReaderErr as ERR;

	let xhash: Sha256Hash = expect.parse().map_err(ERR::Expected)?;
	let gothash = sha256_file(file)?;

	if xhash != gothash
	{
		return Err(ERR::Hash(xhash.to_string(), gothash.to_string()));
	}
	Ok(())
}



#[cfg(test)]
mod tests
{
	fn start_at_the_beginning() -> &'static str
	{ "Do, a deer, a female deer" }
	fn expect_at_the_beginning() -> &'static str
	{ "762e31fc5d92b2c6d7e5a9485cab35714f5e27457e252d0126663554280099fe" }

	#[test]
	fn sha256()
	{
		let buf = start_at_the_beginning().as_bytes();
		let expect = expect_at_the_beginning();
		super::check_sha256(buf, expect, "Julie Andrews").unwrap();
	}

	#[test]
	fn sha256_roundtrip_display()
	{
		let h: super::Sha256Hash = expect_at_the_beginning().parse().unwrap();
		assert_eq!(h.to_string(), expect_at_the_beginning());
	}

	#[test]
	fn bad_length_rejected()
	{
		let e = "deadbeef".parse::<super::Sha256Hash>().unwrap_err();
		assert!(matches!(e, super::HashParseErr::Length(8, _)));
	}
}
