//! Rendering and inheritance tests through the template registry

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use stencil::{MemorySource, Registry, Value, Variables};

fn vars(pairs: &[(&str, Value)]) -> Variables {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn render_one(source: &str, variables: Variables) -> String {
    let registry = Registry::new(MemorySource::new().with_template("main", source));
    registry
        .render("main", variables)
        .await
        .expect("Should render")
}

#[tokio::test]
async fn test_template_without_tags_renders_verbatim() {
    let source = "<ul>\n  <li>one</li>\n  <li>two</li>\n</ul>\n";
    assert_eq!(render_one(source, Variables::new()).await, source);
}

#[tokio::test]
async fn test_arithmetic_and_concatenation() {
    insta::assert_snapshot!(render_one("{{ 1 + 2 }}", Variables::new()).await, @"3");
    insta::assert_snapshot!(render_one(r#"{{ "a" + "b" }}"#, Variables::new()).await, @"ab");
}

#[tokio::test]
async fn test_if_false_renders_else() {
    let out = render_one("{% if false %}A{% else %}B{% endif %}", Variables::new()).await;
    assert_eq!(out, "B");
}

#[tokio::test]
async fn test_loop_does_not_stop_at_falsy_element() {
    let out = render_one("{% for x in [1, 0, 2] %}{{x}}-{% endfor %}", Variables::new()).await;
    assert_eq!(out, "1-0-2-");
}

#[tokio::test]
async fn test_undefined_variable_renders_empty() {
    let out = render_one("a{{ missing }}b{{ missing.deeper[0] }}c", Variables::new()).await;
    assert_eq!(out, "abc");
}

#[tokio::test]
async fn test_malformed_expression_does_not_abort_siblings() {
    let out = render_one("[{{ 1 + }}][{{ ok }}]", vars(&[("ok", Value::from("fine"))])).await;
    assert_eq!(out, "[][fine]");
}

#[tokio::test]
async fn test_missing_property_takes_fallback_branches() {
    let mut user = BTreeMap::new();
    user.insert("name".to_string(), Value::from("Ada"));
    let variables = vars(&[
        ("user", Value::Object(user)),
        ("items", Value::from(vec!["a"])),
    ]);

    let source = "\
[{% if !user.admin %}guest{% else %}admin{% endif %}]\
[{{ user.nickname || user.name }}]\
[{{ items[5] || 'none' }}]\
[{% if user.admin == null %}no-flag{% endif %}]";
    let out = render_one(source, variables).await;
    assert_eq!(out, "[guest][Ada][none][no-flag]");
}

#[tokio::test]
async fn test_page_with_data() {
    let mut user = BTreeMap::new();
    user.insert("name".to_string(), Value::from("Ada"));
    user.insert("admin".to_string(), Value::from(false));

    let source = "\
Hello {{ user.name }}!
{% if user.admin %}[admin]{% else if items.length > 2 %}[busy]{% else %}[guest]{% endif %}
{% for item in items %}- {{ item }}
{% endfor %}";
    let out = render_one(
        source,
        vars(&[
            ("user", Value::Object(user)),
            ("items", Value::from(vec!["x", "y", "z"])),
        ]),
    )
    .await;

    assert_eq!(out, "Hello Ada!\n[busy]\n- x\n- y\n- z\n");
}

#[tokio::test]
async fn test_child_overrides_block() {
    let source = MemorySource::new()
        .with_template("base", "A{% block content %}Y{% endblock %}B")
        .with_template(
            "child",
            r#"{% extends "base" %}{% block content %}X{% endblock %}"#,
        );
    let registry = Registry::new(source);

    let out = registry
        .render("child", Variables::new())
        .await
        .expect("Should render");
    insta::assert_snapshot!(out, @"AXB");
}

#[tokio::test]
async fn test_non_overridden_block_uses_nearest_ancestor() {
    let source = MemorySource::new()
        .with_template(
            "base",
            "{% block title %}Base{% endblock %}|{% block body %}base body{% endblock %}",
        )
        .with_template(
            "section",
            "{% extends base %}{% block title %}Section{% endblock %}",
        )
        .with_template(
            "page",
            "{% extends section %}{% block body %}page body{% endblock %}",
        );
    let registry = Registry::new(source);

    assert_eq!(
        registry.render("page", Variables::new()).await.expect("Should render"),
        "Section|page body"
    );
    assert_eq!(
        registry.render("section", Variables::new()).await.expect("Should render"),
        "Section|base body"
    );
    assert_eq!(
        registry.render("base", Variables::new()).await.expect("Should render"),
        "Base|base body"
    );
}

#[tokio::test]
async fn test_child_structure_outside_blocks_is_ignored() {
    let source = MemorySource::new()
        .with_template("base", "<{% block a %}{% endblock %}>")
        .with_template(
            "child",
            "ignored {{ 1 + 1 }}{% extends base %}{% block a %}kept{% endblock %} also ignored",
        );
    let registry = Registry::new(source);

    let out = registry.render("child", Variables::new()).await.expect("Should render");
    assert_eq!(out, "<kept>");
}

#[tokio::test]
async fn test_nested_blocks_resolve_against_requested_template() {
    let source = MemorySource::new()
        .with_template(
            "base",
            "{% block outer %}[{% block inner %}base-inner{% endblock %}]{% endblock %}",
        )
        .with_template(
            "middle",
            "{% extends base %}{% block outer %}<{% block inner %}middle-inner{% endblock %}>{% endblock %}",
        )
        .with_template(
            "child",
            "{% extends middle %}{% block inner %}child-inner{% endblock %}",
        );
    let registry = Registry::new(source);

    assert_eq!(
        registry.render("child", Variables::new()).await.expect("Should render"),
        "<child-inner>"
    );
    assert_eq!(
        registry.render("middle", Variables::new()).await.expect("Should render"),
        "<middle-inner>"
    );
}

#[tokio::test]
async fn test_override_renders_with_loop_variables() {
    let source = MemorySource::new()
        .with_template(
            "list",
            "{% for item in items %}{% block row %}{{ item }}{% endblock %},{% endfor %}",
        )
        .with_template(
            "fancy",
            "{% extends list %}{% block row %}*{{ item + suffix }}*{% endblock %}",
        );
    let registry = Registry::new(source);

    let out = registry
        .render(
            "fancy",
            vars(&[
                ("items", Value::from(vec!["a", "b"])),
                ("suffix", Value::from("!")),
            ]),
        )
        .await
        .expect("Should render");
    assert_eq!(out, "*a!*,*b!*,");
}

#[tokio::test]
async fn test_block_missing_everywhere_renders_nothing() {
    // A base whose block body is empty and which nobody overrides
    let registry = Registry::new(
        MemorySource::new().with_template("base", "x{% block empty %}{% endblock %}y"),
    );
    let out = registry.render("base", Variables::new()).await.expect("Should render");
    assert_eq!(out, "xy");
}
