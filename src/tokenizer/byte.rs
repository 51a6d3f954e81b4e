use super::Tokenizer;

/// One token per UTF-8 byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    pub fn new() -> Self {
        ByteTokenizer
    }
}

impl Tokenizer for ByteTokenizer {
    fn vocab_size(&self) -> usize {
        256
    }
    fn tokenize(&self, string: &str) -> Vec<usize> {
        string.as_bytes().iter().map(|b| *b as usize).collect()
    }
    fn untokenize(&self, tokens: &[usize]) -> String {
        let bytes = tokens
            .iter()
            .filter_map(|t| u8::try_from(*t).ok())
            .collect::<Vec<u8>>();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        let tokenizer = ByteTokenizer::new();
        let text = "naïve text";
        let tokens = tokenizer.tokenize(text);
        assert_eq!(tokens.len(), text.len());
        assert!(tokens.iter().all(|t| *t < tokenizer.vocab_size()));
        assert_eq!(tokenizer.untokenize(&tokens), text);
    }
}
