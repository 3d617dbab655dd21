//! Object-naming conventions for chunked uploads.
//!
//! A large object named `archive` is stored as chunk objects
//! `archive-chunk-0000-size-10485760`, `archive-chunk-0001-size-10485760`,
//! ..., leaf manifests `archive-manifest-0000`, ..., and a top-level
//! manifest named plainly `archive`. The zero-padded chunk number lets a
//! later run recognize chunks that are already present server-side.

/// Build the object name for one chunk of a large upload.
///
/// # Arguments
/// * `object` - Name of the final, user-visible object
/// * `number` - Zero-based chunk ordinal
/// * `size` - Chunk size in bytes
pub fn chunk_object_name(object: &str, number: u64, size: u64) -> String {
    format!("{object}-chunk-{number:04}-size-{size}")
}

/// Build the object name for one leaf manifest of a large upload.
pub fn manifest_object_name(object: &str, number: u64) -> String {
    format!("{object}-manifest-{number:04}")
}

/// Extract the chunk number from an object name produced by
/// [`chunk_object_name`] for the given `object`.
///
/// Returns `None` for names that belong to other uploads or do not follow
/// the chunk naming convention.
pub fn parse_chunk_number(object: &str, name: &str) -> Option<u64> {
    let rest: &str = name.strip_prefix(object)?.strip_prefix("-chunk-")?;
    let (number, size) = rest.split_once("-size-")?;
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_object_name_pads_number() {
        assert_eq!(chunk_object_name("data", 0, 10), "data-chunk-0000-size-10");
        assert_eq!(chunk_object_name("data", 42, 512), "data-chunk-0042-size-512");
    }

    #[test]
    fn test_chunk_object_name_wide_number() {
        assert_eq!(
            chunk_object_name("data", 12345, 1),
            "data-chunk-12345-size-1"
        );
    }

    #[test]
    fn test_manifest_object_name() {
        assert_eq!(manifest_object_name("data", 3), "data-manifest-0003");
    }

    #[test]
    fn test_parse_chunk_number_round_trip() {
        let name: String = chunk_object_name("backup.tar", 17, 1024);
        assert_eq!(parse_chunk_number("backup.tar", &name), Some(17));
    }

    #[test]
    fn test_parse_chunk_number_rejects_other_uploads() {
        assert_eq!(parse_chunk_number("data", "other-chunk-0000-size-10"), None);
    }

    #[test]
    fn test_parse_chunk_number_rejects_malformed_names() {
        assert_eq!(parse_chunk_number("data", "data"), None);
        assert_eq!(parse_chunk_number("data", "data-chunk-"), None);
        assert_eq!(parse_chunk_number("data", "data-chunk-00x0-size-10"), None);
        assert_eq!(parse_chunk_number("data", "data-chunk-0000-size-"), None);
        assert_eq!(parse_chunk_number("data", "data-chunk-0000-size-1x"), None);
        assert_eq!(parse_chunk_number("data", "data-manifest-0000"), None);
    }
}
