// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for URI parsing and re-qualification

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use urifs_core::uri::Uri;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    uri: &'a str,
    returned: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let Ok(uri) = Uri::parse(input.uri) else {
        return;
    };

    // Parsing the rendered form gives the same URI back
    let rendered = uri.to_string();
    let reparsed = Uri::parse(&rendered).expect("rendered URI must parse");
    assert_eq!(reparsed, uri);

    let _ = uri.local_path();
    let _ = uri.is_root();
    let _ = uri.join(input.returned);

    // Whatever a backend returns stays on the same backend once qualified
    let qualified = uri.qualify(input.returned);
    let back = Uri::parse(&qualified).expect("qualified URI must parse");
    assert_eq!(back.scheme, uri.scheme);
    assert_eq!(back.authority, uri.authority);
    assert_eq!(back.qualify(back.local_path()), back.to_string());
});
