/// Reads a NUL-terminated string from the head of `bytes`. Returns `None`
/// when no terminator exists before the end of the slice.
pub fn string_upto_null_terminator(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_upto_null_terminator() {
        assert_eq!(
            string_upto_null_terminator(b"_malloc\0_free\0"),
            Some("_malloc".to_string())
        );
        assert_eq!(string_upto_null_terminator(b"\0rest"), Some(String::new()));
        assert_eq!(string_upto_null_terminator(b"_malloc"), None);
        assert_eq!(string_upto_null_terminator(b""), None);
    }
}
