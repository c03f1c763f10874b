//! Content-addressed storage for variable dumps
//!
//! Dumps are hashed with BLAKE3 and written once; identical dumps from
//! different hits share one file. Large dumps are zstd-compressed.

use crate::error::{AbuseFilterError, Result};
use crate::parameters::VariableHolder;
use crate::stores::VarDumpStore;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

const HASH_LEN: usize = 32;
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

pub struct BlobStore {
    base_path: PathBuf,
    compression_threshold: usize,
}

impl BlobStore {
    pub fn new(base_path: PathBuf, compression_threshold: usize) -> Result<Self> {
        let dumps_dir = base_path.join("dumps");
        fs::create_dir_all(&dumps_dir).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to create dumps directory: {}", dumps_dir.display()),
        })?;

        Ok(Self {
            base_path,
            compression_threshold,
        })
    }

    /// Store `data` and return its hash. Existing content is not rewritten.
    pub fn write(&self, data: &[u8]) -> Result<String> {
        let hash = format!("{:.32}", blake3::hash(data).to_hex());
        let path = self.blob_path(&hash)?;
        if path.exists() {
            return Ok(hash);
        }

        let payload = if data.len() >= self.compression_threshold {
            zstd::encode_all(data, 3).map_err(|e| AbuseFilterError::Io {
                source: e,
                context: "Failed to compress variable dump".to_string(),
            })?
        } else {
            data.to_vec()
        };

        let parent = path
            .parent()
            .ok_or_else(|| AbuseFilterError::Config("Invalid dump path".to_string()))?;
        fs::create_dir_all(parent).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to create dump directory: {}", parent.display()),
        })?;

        // Write then rename so readers never see a partial dump
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to create {}", temp_path.display()),
        })?;
        file.write_all(&payload)
            .and_then(|_| file.sync_all())
            .map_err(|e| AbuseFilterError::Io {
                source: e,
                context: format!("Failed to write {}", temp_path.display()),
            })?;
        drop(file);
        fs::rename(&temp_path, &path).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to move dump into place: {}", path.display()),
        })?;

        Ok(hash)
    }

    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(hash)?;
        let data = fs::read(&path).map_err(|e| AbuseFilterError::Io {
            source: e,
            context: format!("Failed to read dump {}", hash),
        })?;

        if data.starts_with(&ZSTD_MAGIC) {
            zstd::decode_all(&data[..]).map_err(|e| AbuseFilterError::Io {
                source: e,
                context: format!("Failed to decompress dump {}", hash),
            })
        } else {
            Ok(data)
        }
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.blob_path(hash).map_or(false, |p| p.exists())
    }

    /// `dumps/ab/cd/abcd...`
    fn blob_path(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() != HASH_LEN || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AbuseFilterError::Config(format!(
                "Invalid dump reference: {}",
                hash
            )));
        }
        Ok(self
            .base_path
            .join("dumps")
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash))
    }
}

impl VarDumpStore for BlobStore {
    fn store_dump(&self, vars: &VariableHolder) -> Result<String> {
        self.write(&vars.to_json()?)
    }

    fn load_dump(&self, reference: &str) -> Result<VariableHolder> {
        VariableHolder::from_json(&self.read(reference)?)
    }
}
