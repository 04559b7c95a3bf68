//! A cursor over generic signature strings.
//!
//! [`SignatureReader`] reads signatures one token at a time, but treats a bracketed block
//! (`<...>` type arguments or declarations, `(...)` parameter lists) as one unit regardless
//! of how deeply it nests. The resolver uses this to skip or isolate whole blocks and to
//! split a method signature into per-parameter pieces before resolving any of them.

use crate::Result;

/// Cursor over a signature string.
///
/// # Example
///
/// ```rust
/// use classweave::metadata::generics::SignatureReader;
///
/// let mut reader = SignatureReader::new("<T:Ljava/lang/Object;>(TT;[I)V");
/// assert_eq!(reader.read_block('<', '>')?, "T:Ljava/lang/Object;");
/// assert_eq!(reader.read_block('(', ')')?, "TT;[I");
/// assert_eq!(reader.read_type()?, "V");
/// assert!(reader.is_empty());
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SignatureReader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SignatureReader<'a> {
    /// Create a reader positioned at the start of `input`.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        SignatureReader { input, pos: 0 }
    }

    /// The full input.
    #[must_use]
    pub fn input(&self) -> &'a str {
        self.input
    }

    /// Current byte position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Returns `true` when every character has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// The unread remainder.
    #[must_use]
    pub fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// The next character without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume and return the next character.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] at the end of input.
    pub fn next_char(&mut self) -> Result<char> {
        let c = self
            .peek()
            .ok_or_else(|| malformed_error!("Unexpected end of signature '{}'", self.input))?;
        self.pos += c.len_utf8();
        Ok(c)
    }

    /// Consume `expected` or fail.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the next character differs.
    pub fn expect(&mut self, expected: char) -> Result<()> {
        let found = self.next_char()?;
        if found != expected {
            return Err(malformed_error!(
                "Expected '{}' at {} in signature '{}', found '{}'",
                expected,
                self.pos - found.len_utf8(),
                self.input,
                found
            ));
        }
        Ok(())
    }

    /// Consume `expected` if it is next.
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Read an identifier up to (not including) the first character in `terminators`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an empty identifier or if no terminator follows.
    pub fn read_identifier(&mut self, terminators: &[char]) -> Result<&'a str> {
        let rest = self.rest();
        let end = rest
            .find(|c| terminators.contains(&c))
            .ok_or_else(|| malformed_error!("Unterminated identifier in signature '{}'", self.input))?;
        if end == 0 {
            return Err(malformed_error!(
                "Empty identifier at {} in signature '{}'",
                self.pos,
                self.input
            ));
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    /// Read a bracketed block and return its interior, consuming both brackets.
    ///
    /// Nested `<`/`>` and `(`/`)` pairs inside the block are skipped as a whole.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the block does not start with `open` or never
    /// closes.
    pub fn read_block(&mut self, open: char, close: char) -> Result<&'a str> {
        self.expect(open)?;
        let start = self.pos;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_char()? {
                '<' | '(' => depth += 1,
                '>' | ')' => depth -= 1,
                _ => {}
            }
        }
        let interior = &self.input[start..self.pos - close.len_utf8()];
        if !self.input[..self.pos].ends_with(close) {
            return Err(malformed_error!(
                "Block opened with '{}' closes with a different bracket in '{}'",
                open,
                self.input
            ));
        }
        Ok(interior)
    }

    /// Read one complete type signature (`B`..`Z`, `V`, `L...;`, `T...;`, `[...`) and
    /// return it as written.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown type tag or an unterminated type.
    pub fn read_type(&mut self) -> Result<&'a str> {
        let start = self.pos;
        self.skip_type()?;
        Ok(&self.input[start..self.pos])
    }

    fn skip_type(&mut self) -> Result<()> {
        match self.next_char()? {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 'V' => Ok(()),
            '[' => self.skip_type(),
            'T' => {
                self.read_identifier(&[';'])?;
                self.expect(';')
            }
            'L' => loop {
                match self.peek() {
                    Some('<') => {
                        self.read_block('<', '>')?;
                    }
                    Some(';') => {
                        self.pos += 1;
                        return Ok(());
                    }
                    Some(_) => {
                        self.next_char()?;
                    }
                    None => {
                        return Err(malformed_error!(
                            "Unterminated class type in signature '{}'",
                            self.input
                        ))
                    }
                }
            },
            other => Err(malformed_error!(
                "Unknown type tag '{}' in signature '{}'",
                other,
                self.input
            )),
        }
    }
}

/// Split the parameter block of a method signature into one signature per parameter.
///
/// A leading type-parameter block is skipped.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the signature has no parameter block or a
/// parameter cannot be read.
pub fn parameter_signatures(signature: &str) -> Result<Vec<&str>> {
    let mut reader = SignatureReader::new(signature);
    if reader.peek() == Some('<') {
        reader.read_block('<', '>')?;
    }
    let block = reader.read_block('(', ')')?;
    let mut inner = SignatureReader::new(block);
    let mut parameters = Vec::new();
    while !inner.is_empty() {
        parameters.push(inner.read_type()?);
    }
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_nest() {
        let mut reader = SignatureReader::new("<K:Ljava/lang/Object;V:Ljava/util/List<TK;>;>rest");
        assert_eq!(
            reader.read_block('<', '>').unwrap(),
            "K:Ljava/lang/Object;V:Ljava/util/List<TK;>;"
        );
        assert_eq!(reader.rest(), "rest");
    }

    #[test]
    fn reads_whole_types() {
        let mut reader = SignatureReader::new("Ljava/util/Map<TK;Ljava/util/List<*>;>;[[TV;J");
        assert_eq!(reader.read_type().unwrap(), "Ljava/util/Map<TK;Ljava/util/List<*>;>;");
        assert_eq!(reader.read_type().unwrap(), "[[TV;");
        assert_eq!(reader.read_type().unwrap(), "J");
        assert!(reader.is_empty());
    }

    #[test]
    fn splits_parameters() {
        let parameters =
            parameter_signatures("<T:Ljava/lang/Object;>(ILjava/util/List<TT;>;[TT;)V").unwrap();
        assert_eq!(parameters, vec!["I", "Ljava/util/List<TT;>;", "[TT;"]);
        assert!(parameter_signatures("Ljava/lang/Object;").is_err());
    }

    #[test]
    fn errors() {
        assert!(SignatureReader::new("<T:").read_block('<', '>').is_err());
        assert!(SignatureReader::new("Q").read_type().is_err());
        assert!(SignatureReader::new("Ljava/lang").read_type().is_err());
        assert!(SignatureReader::new("<A)").read_block('<', '>').is_err());
    }
}
