//! Closed word lists used by the feature extractor. Membership is part of the
//! feature contract: changing either list changes `keyword_count` or
//! `normalized_text` for existing mail.

/// Function words dropped from the token text.
pub const STOPWORDS: [&str; 60] = [
    "the", "a", "an", "and", "or", "but", "if", "to", "of", "in", "on", "for", "with", "at", "by",
    "from", "as", "is", "are", "was", "were", "be", "been", "it", "this", "that", "these", "those",
    "you", "your", "yours", "we", "us", "our", "they", "their", "them", "he", "she", "his", "her",
    "its", "not", "no", "do", "does", "did", "can", "could", "should", "would", "will", "just",
    "about", "into", "out", "up", "down", "over", "under",
];

/// Phrases typical of credential phishing and payment fraud. Matched as
/// substrings of the cleaned text, so "card" also counts inside "credit card".
pub const PHISHING_KEYWORDS: [&str; 17] = [
    "verify",
    "account",
    "password",
    "login",
    "urgent",
    "click",
    "bank",
    "confirm",
    "suspend",
    "update",
    "security",
    "credit card",
    "card",
    "ssn",
    "invoice",
    "payment",
    "wire",
];
