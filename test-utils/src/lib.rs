/// Asserts that two multi-line strings are equal, printing an aligned
/// gutter diff on mismatch.
///
/// Built for bytecode/block listings: matching lines print once with a
/// line-number gutter, diverging lines print as `-` (expected) and `+`
/// (actual) pairs, and missing lines surface as one-sided entries instead
/// of being silently truncated.
///
/// # Arguments
/// * `actual` - The actual string value
/// * `expected` - The expected string value
/// * `context_name` - Name used in the panic message (e.g., "function listing")
/// * `additional_context` - Optional (label, value) pair shown before the
///   diff, typically the input that produced `actual`
pub fn assert_strings_with_diff(
    actual: &str,
    expected: &str,
    context_name: &str,
    additional_context: Option<(&str, &str)>,
) {
    let actual = actual.trim();
    let expected = expected.trim();
    if actual == expected {
        return;
    }

    if let Some((label, value)) = additional_context {
        eprintln!("=== {} ===\n{}\n", label, value.trim());
    }

    let want: Vec<&str> = expected.lines().collect();
    let got: Vec<&str> = actual.lines().collect();
    eprintln!("--- expected  +++ actual");
    for i in 0..want.len().max(got.len()) {
        match (want.get(i), got.get(i)) {
            (Some(w), Some(g)) if w == g => eprintln!("  {:>4} | {w}", i + 1),
            (w, g) => {
                if let Some(w) = w {
                    eprintln!("- {:>4} | {w}", i + 1);
                }
                if let Some(g) = g {
                    eprintln!("+ {:>4} | {g}", i + 1);
                }
            }
        }
    }
    if want.len() != got.len() {
        eprintln!("({} lines expected, {} produced)", want.len(), got.len());
    }

    panic!("{context_name} mismatch");
}
