//! Gzip tarball of JSON documents, optionally AES-256-CBC encrypted.
//!
//! An encrypted member is laid out as
//! `plaintext length (u64 LE) ‖ IV (16 bytes) ‖ ciphertext`. The plaintext is
//! zero padded to the block size before encryption and cut back to the
//! recorded length after decryption.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::ArchiveError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK: usize = 16;
const LENGTH_PREFIX: usize = 8;

/// Decode a base64 AES-256 key.
pub fn decode_key(key: &str) -> Result<[u8; 32], ArchiveError> {
    let bytes = STANDARD
        .decode(key.trim())
        .map_err(|_| ArchiveError::InvalidKey)?;
    bytes.try_into().map_err(|_| ArchiveError::InvalidKey)
}

/// Encrypt `plaintext` into the member format.
pub fn seal(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut padded = plaintext.to_vec();
    padded.resize(plaintext.len() + BLOCK - plaintext.len() % BLOCK, 0);
    let ciphertext =
        Aes256CbcEnc::new(&(*key).into(), &(*iv).into()).encrypt_padded_vec_mut::<NoPadding>(&padded);

    let mut sealed = Vec::with_capacity(LENGTH_PREFIX + BLOCK + ciphertext.len());
    sealed.extend_from_slice(&(plaintext.len() as u64).to_le_bytes());
    sealed.extend_from_slice(iv);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

fn unseal(key: &[u8; 32], member: &str, sealed: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let bad = || ArchiveError::Object(member.to_string());
    if sealed.len() < LENGTH_PREFIX + BLOCK {
        return Err(bad());
    }
    let (prefix, rest) = sealed.split_at(LENGTH_PREFIX);
    let (iv, ciphertext) = rest.split_at(BLOCK);
    let length = u64::from_le_bytes(prefix.try_into().map_err(|_| bad())?);

    let mut plaintext = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| bad())?
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| bad())?;
    let length = usize::try_from(length).map_err(|_| bad())?;
    if length > plaintext.len() {
        return Err(bad());
    }
    plaintext.truncate(length);
    Ok(plaintext)
}

/// Read-only view of a run archive.
#[derive(Debug, Clone)]
pub struct RunArchive {
    path: PathBuf,
    key: Option<[u8; 32]>,
    /// Member basename to full member name.
    members: BTreeMap<String, String>,
}

impl RunArchive {
    pub fn open(path: impl AsRef<Path>, key: Option<&str>) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        let key = key.map(decode_key).transpose()?;

        let mut members = BTreeMap::new();
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&path)?));
        for entry in archive.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let full = entry.path()?.to_string_lossy().into_owned();
            if let Some(base) = Path::new(&full).file_name() {
                members.insert(base.to_string_lossy().into_owned(), full);
            }
        }

        tracing::debug!(path = %path.display(), members = members.len(), "Opened run archive");
        Ok(Self { path, key, members })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basenames of every member, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.contains_key(member)
    }

    fn read_bytes(&self, member: &str) -> Result<Vec<u8>, ArchiveError> {
        let full = self
            .members
            .get(member)
            .ok_or_else(|| ArchiveError::MissingMember(member.to_string()))?;

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&self.path)?));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() == full.as_str() {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                return Ok(buf);
            }
        }
        Err(ArchiveError::MissingMember(member.to_string()))
    }

    /// Read and decode one JSON member by basename.
    pub fn read(&self, member: &str) -> Result<serde_json::Value, ArchiveError> {
        let raw = self.read_bytes(member)?;
        let data = match &self.key {
            Some(key) => unseal(key, member, &raw)?,
            None => raw,
        };
        serde_json::from_slice(&data).map_err(|_| ArchiveError::Object(member.to_string()))
    }
}

/// Writes run archives in the format [`RunArchive`] reads.
pub struct ArchiveWriter {
    builder: tar::Builder<GzEncoder<File>>,
    key: Option<[u8; 32]>,
    prefix: String,
}

impl ArchiveWriter {
    /// Members are stored under `prefix/`.
    pub fn create(path: impl AsRef<Path>, prefix: &str, key: Option<&str>) -> Result<Self, ArchiveError> {
        let key = key.map(decode_key).transpose()?;
        let file = File::create(path)?;
        Ok(Self {
            builder: tar::Builder::new(GzEncoder::new(file, Compression::default())),
            key,
            prefix: prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn add_json(&mut self, name: &str, value: &serde_json::Value) -> Result<(), ArchiveError> {
        let plain = serde_json::to_vec(value).map_err(|_| ArchiveError::Object(name.to_string()))?;
        let data = match &self.key {
            Some(key) => seal(key, uuid::Uuid::new_v4().as_bytes(), &plain),
            None => plain,
        };
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        self.builder
            .append_data(&mut header, format!("{}/{name}", self.prefix), data.as_slice())?;
        Ok(())
    }

    pub fn finish(self) -> Result<(), ArchiveError> {
        self.builder.into_inner()?.finish()?;
        Ok(())
    }
}
