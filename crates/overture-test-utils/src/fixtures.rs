//! Archive and payload fixtures.

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

enum Node {
    File {
        path: String,
        bytes: Vec<u8>,
        mode: u32,
    },
    Dir(String),
    Symlink {
        path: String,
        target: String,
    },
}

/// Builds `.tar.gz` archives in memory.
#[derive(Default)]
pub struct TarGzBuilder {
    nodes: Vec<Node>,
}

impl std::fmt::Debug for TarGzBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarGzBuilder")
            .field("entries", &self.nodes.len())
            .finish()
    }
}

impl TarGzBuilder {
    /// Empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a regular file.
    #[must_use]
    pub fn file(mut self, path: &str, bytes: &[u8], mode: u32) -> Self {
        self.nodes.push(Node::File {
            path: path.to_string(),
            bytes: bytes.to_vec(),
            mode,
        });
        self
    }

    /// Add a directory entry.
    #[must_use]
    pub fn dir(mut self, path: &str) -> Self {
        self.nodes.push(Node::Dir(path.to_string()));
        self
    }

    /// Add a symlink.
    #[must_use]
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.nodes.push(Node::Symlink {
            path: path.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// Encode the archive.
    ///
    /// # Panics
    /// Panics if an entry cannot be encoded.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let mut tar = tar::Builder::new(encoder);
        for node in self.nodes {
            let mut header = tar::Header::new_gnu();
            match node {
                Node::File { path, bytes, mode } => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(bytes.len() as u64);
                    header.set_mode(mode);
                    header.set_cksum();
                    tar.append_data(&mut header, path, bytes.as_slice())
                        .expect("append file");
                }
                Node::Dir(path) => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    tar.append_data(&mut header, path, std::io::empty())
                        .expect("append dir");
                }
                Node::Symlink { path, target } => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    tar.append_link(&mut header, path, target)
                        .expect("append symlink");
                }
            }
        }
        tar.into_inner()
            .and_then(GzEncoder::finish)
            .expect("finish archive")
    }

    /// Encode the archive and write it to `path`.
    ///
    /// # Panics
    /// Panics on encoding or IO failure.
    pub fn write_to(self, path: &Path) {
        std::fs::write(path, self.build()).expect("write archive");
    }
}

/// Deterministic pseudo-random bytes.
#[must_use]
pub fn sample_bytes(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Script that mimics `php -v` for `version`.
#[must_use]
pub fn fake_php_script(version: &str) -> String {
    format!("#!/bin/sh\necho \"PHP {version} (cli) (built: fixture)\"\n")
}

/// A prebuilt runtime archive with a top-level `php-<version>/` directory.
#[must_use]
pub fn php_prebuilt_tarball(version: &str) -> Vec<u8> {
    let root = format!("php-{version}");
    TarGzBuilder::new()
        .dir(&format!("{root}/bin"))
        .file(
            &format!("{root}/bin/php"),
            fake_php_script(version).as_bytes(),
            0o755,
        )
        .file(&format!("{root}/lib/php.ini-development"), b"; ini\n", 0o644)
        .build()
}

/// A source archive with a no-op `configure` script.
#[must_use]
pub fn php_source_tarball(version: &str) -> Vec<u8> {
    let root = format!("php-{version}");
    TarGzBuilder::new()
        .file(&format!("{root}/configure"), b"#!/bin/sh\nexit 0\n", 0o755)
        .file(&format!("{root}/main/php_version.h"), version.as_bytes(), 0o644)
        .build()
}

/// A PECL package archive.
#[must_use]
pub fn pecl_tarball(name: &str, version: &str) -> Vec<u8> {
    let root = format!("{name}-{version}");
    TarGzBuilder::new()
        .file(&format!("{root}/config.m4"), b"dnl config\n", 0o644)
        .file(&format!("{root}/{name}.c"), b"/* ext */\n", 0o644)
        .build()
}

/// Body shaped like the php.net releases feed.
///
/// `releases` lists `(version, file_name, sha256)` triples.
///
/// # Panics
/// Panics if serialization fails.
#[must_use]
pub fn php_releases_json(releases: &[(&str, &str, &str)]) -> String {
    let mut feed: BTreeMap<String, sonic_rs::Value> = BTreeMap::new();
    for (version, file_name, sha256) in releases {
        feed.insert(
            (*version).to_string(),
            sonic_rs::json!({
                "version": *version,
                "date": "01 Jan 2024",
                "source": [
                    { "filename": *file_name, "name": "PHP source", "sha256": *sha256 }
                ]
            }),
        );
    }
    sonic_rs::to_string(&feed).expect("serialize releases")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    #[test]
    fn sample_bytes_are_stable() {
        assert_eq!(sample_bytes(64), sample_bytes(64));
        assert_eq!(sample_bytes(10).len(), 10);
        assert_ne!(sample_bytes(32), vec![0u8; 32]);
    }

    #[test]
    fn sha256_of_hello() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn prebuilt_tarball_contains_binary() {
        let bytes = php_prebuilt_tarball("8.3.4");
        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut found = false;
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap().to_string_lossy() == "php-8.3.4/bin/php" {
                let mut body = String::new();
                entry.read_to_string(&mut body).unwrap();
                assert!(body.contains("PHP 8.3.4"));
                found = true;
            }
        }
        assert!(found);
    }

    #[test]
    fn releases_feed_has_checksums() {
        let body = php_releases_json(&[("8.3.4", "php-8.3.4.tar.gz", "ab")]);
        assert!(body.contains("\"8.3.4\""));
        assert!(body.contains("\"sha256\":\"ab\""));
    }
}
