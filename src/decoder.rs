//! Thin (de)serialization layer over a seekable byte stream, wrapping
//! `bincode`'s fixed-width little-endian encoding the way the teacher's
//! `rufs::decoder` wraps UFS's configurable-endian encoding. SOFS14's layout
//! is always little-endian, so there is only one [`Config`].

use std::io::{BufRead, Read, Result, Seek, SeekFrom, Write};

use bincode::{
	config::{Configuration, Fixint, LittleEndian, NoLimit},
	Decode, Encode,
};

const CONFIG: Configuration<LittleEndian, Fixint, NoLimit> =
	bincode::config::standard().with_fixed_int_encoding().with_little_endian();

pub struct Codec<T> {
	inner: T,
}

impl<T> Codec<T> {
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn inner(&self) -> &T {
		&self.inner
	}

	pub fn inner_mut(&mut self) -> &mut T {
		&mut self.inner
	}

	pub fn into_inner(self) -> T {
		self.inner
	}
}

impl<T: BufRead> Codec<T> {
	pub fn decode<X: Decode>(&mut self) -> Result<X> {
		bincode::decode_from_reader(&mut self.inner, CONFIG)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
	}

	pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
		self.inner.read_exact(buf)
	}
}

impl<T: Write> Codec<T> {
	pub fn encode<X: Encode>(&mut self, val: &X) -> Result<()> {
		bincode::encode_into_std_write(val, &mut self.inner, CONFIG)
			.map(|_| ())
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
	}

	pub fn write(&mut self, buf: &[u8]) -> Result<()> {
		self.inner.write_all(buf)
	}

	pub fn fill(&mut self, byte: u8, len: usize) -> Result<()> {
		let buf = vec![byte; len];
		self.write(&buf)
	}
}

impl<T: BufRead + Seek> Codec<T> {
	pub fn seek(&mut self, pos: u64) -> Result<()> {
		self.inner.seek(SeekFrom::Start(pos))?;
		Ok(())
	}

	pub fn pos(&mut self) -> Result<u64> {
		self.inner.stream_position()
	}

	pub fn decode_at<X: Decode>(&mut self, pos: u64) -> Result<X> {
		self.seek(pos)?;
		self.decode()
	}

	pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
		self.seek(pos)?;
		self.read(buf)
	}
}

impl<T: BufRead + Write + Seek> Codec<T> {
	pub fn encode_at<X: Encode>(&mut self, pos: u64, val: &X) -> Result<()> {
		self.seek(pos)?;
		self.encode(val)
	}

	pub fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
		self.seek(pos)?;
		self.write(buf)
	}

	pub fn fill_at(&mut self, pos: u64, byte: u8, len: usize) -> Result<()> {
		self.seek(pos)?;
		self.fill(byte, len)
	}
}
