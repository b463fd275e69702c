mod parser;

use combine::Parser;

/// Extracts the bare address from a `From` header value and normalizes
/// it for use as a counting / membership key.
///
/// Accepts the shapes Gmail actually emits: `Name <user@host>`,
/// `"Quoted Name" <user@host>`, and a bare `user@host`. The first
/// well-formed angle-addr wins; a quoted display name may contain `<`
/// without confusing extraction.
///
/// When nothing address-like can be parsed, the whole trimmed value is
/// used verbatim, so malformed senders still get a stable key.
pub fn sender_address(from: &str) -> String {
    let from = from.trim();
    match parser::mailbox().parse(from) {
        Ok((addr, _)) => addr.trim().to_ascii_lowercase(),
        Err(_) => from.to_ascii_lowercase(),
    }
}
