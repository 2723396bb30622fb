mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Runs an `async fn` test to completion with `singlepoll::block_on`.
///
/// ```rust,ignore
/// #[singlepoll::test]
/// async fn ready() { /* ... */ }
///
/// #[singlepoll::test(timeout_ms = 500)]
/// async fn bounded() { /* ... */ }
/// ```
///
/// With `timeout_ms`, the body runs on its own thread and the test fails
/// if it has not finished in time. A panic in the body is re-raised on
/// the test thread, so `#[should_panic]` keeps working.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match utils::parse_test_args(attr) {
        Ok(args) => args,
        Err(msg) => return utils::compile_error(&format!("singlepoll::test: {msg}")),
    };

    let mut tokens = item.into_iter().collect::<Vec<_>>();

    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }

    let block_pos = tokens.iter().rposition(
        |t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace),
    );

    let Some(pos) = block_pos else {
        return utils::compile_error("singlepoll::test expects a function body");
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = match args.timeout_ms {
        None => format!(
            "{{
            ::singlepoll::block_on(async move {{ {block} }})
        }}"
        ),
        Some(ms) => format!(
            "{{
            let (__tx, __rx) = ::std::sync::mpsc::channel();
            ::std::thread::spawn(move || {{
                let __result = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {{
                    ::singlepoll::block_on(async move {{ {block} }})
                }}));
                let _ = __tx.send(__result);
            }});
            match __rx.recv_timeout(::std::time::Duration::from_millis({ms})) {{
                ::std::result::Result::Ok(::std::result::Result::Ok(__value)) => __value,
                ::std::result::Result::Ok(::std::result::Result::Err(__panic)) => {{
                    ::std::panic::resume_unwind(__panic)
                }}
                ::std::result::Result::Err(_) => panic!(\"test exceeded {ms} ms\"),
            }}
        }}"
        ),
    };

    let body = match new_block.parse() {
        Ok(body) => body,
        Err(err) => return utils::compile_error(&format!("singlepoll::test: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, body));

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
