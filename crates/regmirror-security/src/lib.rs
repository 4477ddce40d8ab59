mod checksum;

pub use checksum::{
    checksums_match, sha1_file_hex, sha1_hex, sha256_file_hex, sha256_hex,
};
