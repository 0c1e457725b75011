use std::ascii;

/// Renders arbitrary bytes as printable ASCII for logging.
pub(crate) fn bytes_to_human_str(input: &[u8]) -> String {
    input
        .iter()
        .flat_map(|&c| ascii::escape_default(c))
        .map(char::from)
        .collect()
}
