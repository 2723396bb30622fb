use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Options accepted by `#[singlepoll::test(..)]`.
#[derive(Default)]
pub(crate) struct TestArgs {
    /// Fail the test if its body runs longer than this.
    pub(crate) timeout_ms: Option<u64>,
}

/// Parses `key = value` pairs from the attribute arguments.
///
/// Returns a human-readable message for anything it does not understand.
pub(crate) fn parse_test_args(attr: TokenStream) -> Result<TestArgs, String> {
    let mut parsed = TestArgs::default();

    for arg in split_args(attr) {
        let (key, value) = match arg.as_slice() {
            [TokenTree::Ident(key), TokenTree::Punct(eq), TokenTree::Literal(value)]
                if eq.as_char() == '=' =>
            {
                (key.to_string(), value.to_string())
            }
            _ => return Err("expected `key = value`".into()),
        };

        match key.as_str() {
            "timeout_ms" => {
                let ms = value
                    .trim_end_matches("u64")
                    .replace('_', "")
                    .parse::<u64>()
                    .map_err(|_| format!("`timeout_ms` must be an integer, got `{value}`"))?;
                parsed.timeout_ms = Some(ms);
            }
            other => return Err(format!("unknown argument `{other}`")),
        }
    }

    Ok(parsed)
}

/// Builds a `compile_error!` invocation carrying `msg`.
pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
