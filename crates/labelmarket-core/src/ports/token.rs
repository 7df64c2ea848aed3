//! TokenGenerator port - lease token の生成

use crate::domain::LeaseToken;

/// Source of unguessable lease tokens.
pub trait TokenGenerator: Send + Sync {
    fn next_token(&self) -> LeaseToken;
}

/// 128 bits from the thread-local CSPRNG, rendered as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn next_token(&self) -> LeaseToken {
        let bits: u128 = rand::random();
        LeaseToken::new(format!("{bits:032x}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_128_bit_hex() {
        let token = RandomTokenGenerator.next_token();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let tokens: HashSet<_> = (0..1000).map(|_| RandomTokenGenerator.next_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
