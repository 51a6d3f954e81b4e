mod byte;
pub use byte::*;

mod simple;
pub use simple::*;

/// Text <-> token id conversion. Any vocabulary (for instance the 50,257
/// entry GPT-2 BPE) plugs into the model through this trait.
pub trait Tokenizer {
    fn vocab_size(&self) -> usize;
    fn tokenize(&self, string: &str) -> Vec<usize>;
    fn untokenize(&self, tokens: &[usize]) -> String;
}
