//! Property tests for first-match prefix dispatch.

use proptest::prelude::*;
use switchyard_core::fixtures::TextHandler;
use switchyard_core::{Request, Response};
use switchyard_router::{PrefixRouter, RouteTarget};

use http::Method;

fn build(prefixes: &[String]) -> PrefixRouter {
    prefixes
        .iter()
        .enumerate()
        .fold(
            PrefixRouter::builder(TextHandler::new("fallback")),
            |builder, (i, prefix)| {
                let body = format!("binding-{i}");
                builder.route(prefix.clone(), move || TextHandler::new(body.clone()))
            },
        )
        .build()
        .expect("non-empty prefixes")
}

fn prefix_strategy() -> impl Strategy<Value = String> {
    "/[a-c]{0,3}"
}

proptest! {
    #[test]
    fn test_first_matching_prefix_wins(
        prefixes in prop::collection::vec(prefix_strategy(), 0..6),
        path in "/[a-c/]{0,6}",
    ) {
        let router = build(&prefixes);
        let expected = prefixes.iter().position(|p| path.starts_with(p.as_str()));

        match (router.resolve(&path), expected) {
            (RouteTarget::Binding { index, prefix }, Some(want)) => {
                prop_assert_eq!(index, want);
                prop_assert_eq!(prefix, prefixes[want].as_str());
            }
            (RouteTarget::Fallback, None) => {}
            (got, want) => prop_assert!(false, "resolved {got} but expected {want:?}"),
        }

        let mut response = Response::new();
        router
            .dispatch(&Request::new(Method::GET, path.clone()), &mut response)
            .expect("fixture handlers never fail");
        let body = String::from_utf8(response.body().to_vec()).expect("utf8");
        let want = expected.map_or_else(|| "fallback".to_string(), |i| format!("binding-{i}"));
        prop_assert_eq!(body, want);
    }

    #[test]
    fn test_longer_later_prefix_never_wins(
        base in "/[a-z]{1,4}",
        suffix in "[a-z]{1,4}",
        tail in "[a-z/]{0,4}",
    ) {
        let longer = format!("{base}{suffix}");
        let router = build(&[base.clone(), longer.clone()]);
        let path = format!("{longer}{tail}");

        prop_assert_eq!(
            router.resolve(&path),
            RouteTarget::Binding { index: 0, prefix: base.as_str() }
        );
    }
}
