#![forbid(unsafe_code)]

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Ordered replacement table for the five HTML-significant characters.
const HTML_ESCAPES: [(char, &str); 5] = [
    ('&',  "&amp;"),
    ('<',  "&lt;"),
    ('>',  "&gt;"),
    ('"',  "&quot;"),
    ('\'', "&#39;"),
];

// ***************************************************************************
// GENERAL PUBLIC FUNCTIONS
// ***************************************************************************
// ---------------------------------------------------------------------------
// escape_html:
// ---------------------------------------------------------------------------
/** Replace every occurrence of &, <, >, " and ' with its named character
 * reference in a single left-to-right scan; all other characters pass
 * through unchanged.  The function is total over all string inputs,
 * including empty, very long and multi-byte strings.
 *
 * Escaping is NOT idempotent: running an already-escaped string through
 * again double-escapes it.  Callers escape each value exactly once per
 * render.
 */
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match HTML_ESCAPES.iter().find(|(special, _)| *special == c) {
            Some((_, replacement)) => escaped.push_str(replacement),
            None => escaped.push(c),
        }
    }
    escaped
}
