// ABOUTME: Tests for the transformer pipeline: accumulation semantics, node
// ABOUTME: replacement, trust grants, contract violations, and the Escape transformer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use scour::transformers::Escape;
use scour::{
    dom, transform_fn, Config, Error, Html, Sanitizer, Transform, TransformEnv, TransformResult,
};

fn keep_divs(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
    if env.node_name != "div" {
        return Ok(None);
    }
    Ok(Some(TransformResult {
        whitelist: true,
        ..Default::default()
    }))
}

fn noop(_env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
    Ok(Some(TransformResult::default()))
}

#[test]
fn test_whitelist_flag_survives_later_noop() {
    let config = Config::builder()
        .transformer(transform_fn(keep_divs))
        .transformer(transform_fn(noop))
        .build();
    let out = Sanitizer::new(config).clean("<div>x</div>").unwrap();
    assert_eq!(out, "<div>x</div>");
}

#[test]
fn test_whitelisted_element_still_goes_through_attribute_filtering() {
    let config = Config::builder()
        .transformer(transform_fn(keep_divs))
        .build();
    let out = Sanitizer::new(config)
        .clean("<div onclick=\"x()\">x</div>")
        .unwrap();
    assert_eq!(out, "<div>x</div>");
}

#[test]
fn test_attr_whitelist_accumulates_across_transformers() {
    fn allow_data_a(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        if env.node_name != "span" {
            return Ok(None);
        }
        Ok(Some(TransformResult {
            attr_whitelist: vec!["data-a".to_string()],
            ..Default::default()
        }))
    }
    fn allow_data_b(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        if env.node_name != "span" {
            return Ok(None);
        }
        Ok(Some(TransformResult {
            attr_whitelist: vec!["data-b".to_string()],
            ..Default::default()
        }))
    }

    let config = Config::builder()
        .element("span")
        .transformer(transform_fn(allow_data_a))
        .transformer(transform_fn(allow_data_b))
        .build();
    let out = Sanitizer::new(config)
        .clean("<span data-a=\"1\" data-b=\"2\" data-c=\"3\">x</span>")
        .unwrap();
    assert!(out.contains("data-a=\"1\""), "missing data-a in {out:?}");
    assert!(out.contains("data-b=\"2\""), "missing data-b in {out:?}");
    assert!(!out.contains("data-c"), "data-c survived in {out:?}");
}

#[test]
fn test_replacement_node_takes_original_position() {
    fn calm_marquee(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        if env.node_name != "marquee" {
            return Ok(None);
        }
        let p = match dom::create_element(env.doc, "p") {
            Some(p) => p,
            None => return Ok(None),
        };
        dom::import_fragment(env.doc, p, "calmer");
        Ok(Some(TransformResult {
            node: Some(p),
            ..Default::default()
        }))
    }

    let config = Config::builder()
        .element("p")
        .transformer(transform_fn(calm_marquee))
        .build();
    let out = Sanitizer::new(config)
        .clean("x<marquee>loud</marquee>y")
        .unwrap();
    assert_eq!(out, "x<p>calmer</p>y");
}

#[test]
fn test_trusted_node_bypasses_attribute_filtering() {
    fn trust_spans(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        if env.node_name != "span" {
            return Ok(None);
        }
        Ok(Some(TransformResult {
            whitelist_nodes: vec![env.node],
            ..Default::default()
        }))
    }

    // No allowed elements at all; trust alone keeps the span intact.
    let config = Config::builder()
        .transformer(transform_fn(trust_spans))
        .build();
    let out = Sanitizer::new(config)
        .clean("<span onclick=\"x()\">hi</span>")
        .unwrap();
    assert_eq!(out, "<span onclick=\"x()\">hi</span>");
}

#[test]
fn test_trust_does_not_leak_into_the_next_call() {
    struct OneShot {
        used: AtomicBool,
    }

    impl Transform for OneShot {
        fn evaluate(&self, env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
            if env.node_name != "span" || self.used.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(TransformResult {
                whitelist_nodes: vec![env.node],
                ..Default::default()
            }))
        }
    }

    let config = Config::builder()
        .transformer(Arc::new(OneShot {
            used: AtomicBool::new(false),
        }))
        .build();
    let sanitizer = Sanitizer::new(config);

    let first = sanitizer.clean("<span id=\"a\">hi</span>").unwrap();
    assert_eq!(first, "<span id=\"a\">hi</span>");

    // Same sanitizer, fresh call: the earlier grant is gone.
    let second = sanitizer.clean("<span id=\"a\">hi</span>").unwrap();
    assert_eq!(second, "hi");
}

#[test]
fn test_non_element_replacement_is_a_contract_violation() {
    fn bad_replacement(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        let text = dom::orphan_text(env.doc, "t");
        Ok(Some(TransformResult {
            node: Some(text),
            ..Default::default()
        }))
    }

    let config = Config::builder()
        .element("b")
        .transformer(transform_fn(bad_replacement))
        .build();
    let err = Sanitizer::new(config).clean("<b>x</b>").unwrap_err();
    assert!(err.is_transformer_contract());
}

#[test]
fn test_foreign_trust_handle_is_a_contract_violation() {
    fn trust_foreign(_env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        let donor = Html::parse_fragment("<div><p><b><i><u>deep</u></i></b></p></div>");
        let foreign = donor.tree.root().descendants().last().map(|n| n.id());
        Ok(Some(TransformResult {
            whitelist_nodes: foreign.into_iter().collect(),
            ..Default::default()
        }))
    }

    let config = Config::builder()
        .element("b")
        .transformer(transform_fn(trust_foreign))
        .build();
    let err = Sanitizer::new(config).clean("<b>x</b>").unwrap_err();
    assert!(err.is_transformer_contract());
}

#[test]
fn test_transformer_errors_propagate() {
    fn boom(_env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        Err(anyhow::anyhow!("boom").into())
    }

    let config = Config::builder().transformer(transform_fn(boom)).build();
    let err = Sanitizer::new(config).clean("<b>x</b>").unwrap_err();
    assert!(err.is_transform());
}

#[test]
fn test_escape_transformer_escapes_per_element() {
    let config = Config::builder()
        .elements(["strong", "em"])
        .transformer(Arc::new(Escape))
        .build();
    let out = Sanitizer::new(config)
        .clean("<strong>Hello, <em><div>my friend</div>.</em></strong>")
        .unwrap();
    assert_eq!(
        out,
        "<strong>Hello, <em>&lt;div&gt;my friend&lt;/div&gt;.</em></strong>"
    );
}

#[test]
fn test_escape_transformer_with_empty_allow_list() {
    let config = Config::builder().transformer(Arc::new(Escape)).build();
    let out = Sanitizer::new(config)
        .clean("<strong>Hello, world.</strong>")
        .unwrap();
    assert_eq!(out, "&lt;strong&gt;Hello, world.&lt;/strong&gt;");
}

#[test]
fn test_escape_transformer_respects_trust() {
    fn trust_divs(env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        if env.node_name != "div" {
            return Ok(None);
        }
        Ok(Some(TransformResult {
            whitelist_nodes: vec![env.node],
            ..Default::default()
        }))
    }

    let config = Config::builder()
        .transformer(transform_fn(trust_divs))
        .transformer(Arc::new(Escape))
        .build();
    let out = Sanitizer::new(config)
        .clean("<div class=\"keep\">x</div><span>y</span>")
        .unwrap();
    assert_eq!(out, "<div class=\"keep\">x</div>&lt;span&gt;y&lt;/span&gt;");
}
