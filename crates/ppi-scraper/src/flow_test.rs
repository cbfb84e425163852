use ppi_core::{normalize_retailer, parse_retailers, RetailerConfig, Target, WaitPolicy};

use super::*;
use crate::static_page::StaticHtmlPage;
use crate::test_support::{timeout, ScriptedPage};

const DEMO_URL: &str = "https://demo.local/product/123";

const DEMO_YAML: &str = r#"
retailers:
  demo:
    base_url: "https://demo.local"
    flow:
      - action: goto
        url: "{base_url}/product/{product_id}"
      - action: extract
        fields:
          final_price:
            selectors_priority:
              - "meta[itemprop='price']::attr(content)"
              - ".price"
          discount:
            selector: ".promo"
            optional: true
"#;

const DEMO_HTML: &str = r#"
    <html><body>
      <meta itemprop="price" content="39.90">
      <span class="price">₪ 41.00</span>
    </body></html>
"#;

fn config(yaml: &str, id: &str) -> RetailerConfig {
    let definitions = parse_retailers(yaml).unwrap();
    normalize_retailer(id, &definitions[id]).unwrap()
}

fn target(product_id: &str) -> Target {
    Target::from_pairs([("retailer_id", "demo"), ("product_id", product_id)])
}

fn retailer_yaml(flow: &str) -> String {
    format!("demo:\n  base_url: \"https://demo.local\"\n  flow:\n{flow}")
}

// ---------------------------------------------------------------------------
// build_url
// ---------------------------------------------------------------------------

#[test]
fn build_url_renders_first_goto_with_base_url() {
    let url = build_url("demo", &config(DEMO_YAML, "demo"), &target("123")).unwrap();
    assert_eq!(url, DEMO_URL);
}

#[test]
fn build_url_without_goto_fails() {
    let mut cfg = config(DEMO_YAML, "demo");
    cfg.flow.retain(|step| !matches!(step, FlowStep::Goto { .. }));
    let err = build_url("demo", &cfg, &target("123")).unwrap_err();
    assert!(matches!(err, FlowError::MissingGoto { .. }), "got: {err:?}");
}

#[test]
fn build_url_unknown_placeholder_fails() {
    let yaml = retailer_yaml(
        "    - action: goto\n      url: \"{base_url}/p/{sku}\"\n    - action: extract\n      fields:\n        final_price:\n          selector: \".price\"\n",
    );
    let err = build_url("demo", &config(&yaml, "demo"), &target("1")).unwrap_err();
    assert!(
        matches!(err, FlowError::Template { ref key, .. } if key == "sku"),
        "got: {err:?}"
    );
}

// ---------------------------------------------------------------------------
// run_one: happy path and extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn demo_flow_prefers_meta_price() {
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, DEMO_HTML);
    let row = run_one(&page, "demo", &config(DEMO_YAML, "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(row.url, DEMO_URL);
    assert_eq!(row.final_price.as_deref(), Some("39.90"));
    assert_eq!(row.http_status, Some(200));
    assert_eq!(row.tries, 1);
    assert!(row.discount.is_none());
    assert!(!row.discount_flag);
    assert_eq!(
        page.visits(),
        [(DEMO_URL.to_string(), WaitPolicy::DomContentLoaded)]
    );
}

#[tokio::test]
async fn missing_required_field_names_retailer_and_field() {
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, "<p>sold out</p>");
    let err = run_one(&page, "demo", &config(DEMO_YAML, "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::MissingField { .. }), "got: {err:?}");
    let message = err.to_string();
    assert!(
        message.starts_with("Retailer 'demo' required field 'final_price' not found"),
        "message: {message}"
    );
    assert!(message.contains(".price"), "message: {message}");
}

#[tokio::test]
async fn discount_override_replaces_final_price_regardless_of_field_order() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
    - action: extract
      fields:
        discount:
          selector: ".sale"
          optional: true
          discounted_price_override: true
        final_price:
          selector: ".price"
"#,
    );
    let html = r#"<span class="price">50.00</span><span class="sale">Now ₪ 35.50</span>"#;
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, html);

    let row = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(row.final_price.as_deref(), Some("35.50"));
    assert_eq!(row.discount.as_deref(), Some("Now ₪ 35.50"));
    assert!(row.discount_flag);
}

#[tokio::test]
async fn custom_fields_land_in_extra_and_price_names_are_normalized() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
    - action: extract
      fields:
        final_price:
          selector: ".price"
        club_price:
          selector: ".club"
        brand:
          selector: ".brand"
        badge:
          selector: ".badge"
          optional: true
"#,
    );
    let html = r#"
        <span class="price">20.00</span>
        <span class="club">Club ₪ 1,018.00</span>
        <span class="brand"> Acme </span>
    "#;
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, html);

    let row = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(row.extra["club_price"].as_deref(), Some("1018.00"));
    assert_eq!(row.extra["brand"].as_deref(), Some("Acme"));
    assert_eq!(row.extra["badge"], None);
}

#[tokio::test]
async fn wait_steps_run_in_order() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
    - action: wait_for_selector
      selector: ".price"
      state: attached
    - action: wait_for_timeout
      duration_ms: 250
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#,
    );
    let page = ScriptedPage::new(
        StaticHtmlPage::new().with_document(DEMO_URL, 200, r#"<b class="price">9</b>"#),
    );

    run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(
        page.calls(),
        [
            format!("goto {DEMO_URL} domcontentloaded"),
            "wait .price attached".to_string(),
            "sleep 250".to_string(),
            "locate .price".to_string(),
        ]
    );
}

#[tokio::test]
async fn later_goto_can_use_extracted_values() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/search?q={product_id}"
    - action: extract
      fields:
        product_path:
          selector: "a.result::attr(href)"
    - action: goto
      url: "{base_url}{product_path}"
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#,
    );
    let page = StaticHtmlPage::new()
        .with_document(
            "https://demo.local/search?q=123",
            200,
            r#"<a class="result" href="/item/abc">Widget</a>"#,
        )
        .with_document(
            "https://demo.local/item/abc",
            200,
            r#"<span class="price">12.00</span>"#,
        );

    let row = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(row.url, "https://demo.local/search?q=123");
    assert_eq!(row.final_price.as_deref(), Some("12.00"));
    assert_eq!(row.extra["product_path"].as_deref(), Some("/item/abc"));
    assert_eq!(page.visits().len(), 2);
}

// ---------------------------------------------------------------------------
// run_one: not-found detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn http_404_short_circuits_remaining_steps() {
    let page = ScriptedPage::new(StaticHtmlPage::new().with_document(DEMO_URL, 404, ""));
    let err = run_one(&page, "demo", &config(DEMO_YAML, "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.http_status(), Some(404));
    assert!(page.calls_starting_with("locate").is_empty());
}

#[tokio::test]
async fn soft_not_found_selector_after_success() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#,
    )
    .replace("  flow:", "  not_found:\n    any_selectors: [\".gone\"]\n  flow:");
    let html = r#"<div class="gone">No longer sold</div><span class="price">1.00</span>"#;
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, html);

    let err = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.http_status(), Some(200));
    assert_eq!(
        err.to_string(),
        "Soft 404 / product not found (matched: .gone)"
    );
}

#[tokio::test]
async fn soft_not_found_explains_missing_required_field() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#,
    )
    .replace("  flow:", "  not_found:\n    any_selectors: [\".gone\"]\n  flow:");
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, r#"<p class="gone">x</p>"#);

    let err = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "got: {err:?}");
}

#[tokio::test]
async fn broken_not_found_selector_keeps_missing_field_error() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#,
    )
    .replace("  flow:", "  not_found:\n    any_selectors: [\"div[\"]\n  flow:");
    let page = StaticHtmlPage::new().with_document(DEMO_URL, 200, "<p>sold out</p>");

    let err = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, FlowError::MissingField { ref field, .. } if field == "final_price"),
        "got: {err:?}"
    );
}

// ---------------------------------------------------------------------------
// run_one: navigation policy and retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn networkidle_timeout_falls_back_to_domcontentloaded() {
    let yaml = retailer_yaml(
        r#"    - action: goto
      url: "{base_url}/product/{product_id}"
      wait_until: networkidle
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#,
    );
    let page = ScriptedPage::new(
        StaticHtmlPage::new().with_document(DEMO_URL, 200, r#"<i class="price">7.5</i>"#),
    )
    .fail_next_goto(timeout("navigating"));

    let row = run_one(&page, "demo", &config(&yaml, "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(row.final_price.as_deref(), Some("7.5"));
    assert_eq!(
        page.calls_starting_with("goto"),
        [
            format!("goto {DEMO_URL} networkidle"),
            format!("goto {DEMO_URL} domcontentloaded"),
        ]
    );
}

#[tokio::test]
async fn domcontentloaded_timeout_is_not_retried_without_retry_step() {
    let page = ScriptedPage::new(StaticHtmlPage::new().with_document(DEMO_URL, 200, DEMO_HTML))
        .fail_next_goto(timeout("navigating"));

    let err = run_one(&page, "demo", &config(DEMO_YAML, "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, FlowError::NavigationTimeout { wait_policy: WaitPolicy::DomContentLoaded, .. }),
        "got: {err:?}"
    );
    assert_eq!(page.calls_starting_with("goto").len(), 1);
}

fn retry_yaml(limit: u32) -> String {
    retailer_yaml(&format!(
        r#"    - action: retry
      limit: {limit}
    - action: goto
      url: "{{base_url}}/product/{{product_id}}"
    - action: wait_for_selector
      selector: ".price"
      timeout_ms: 500
    - action: extract
      fields:
        final_price:
          selector: ".price"
"#
    ))
}

#[tokio::test]
async fn retry_reruns_remaining_steps_and_counts_tries() {
    let page = ScriptedPage::new(
        StaticHtmlPage::new().with_document(DEMO_URL, 200, r#"<b class="price">3.00</b>"#),
    )
    .fail_next_wait(timeout("waiting"))
    .fail_next_wait(timeout("waiting"));

    let row = run_one(&page, "demo", &config(&retry_yaml(3), "demo"), &target("123"))
        .await
        .unwrap();

    assert_eq!(row.tries, 3);
    assert_eq!(row.final_price.as_deref(), Some("3.00"));
    assert_eq!(page.calls_starting_with("goto").len(), 3);
}

#[tokio::test]
async fn retry_exhaustion_returns_last_error() {
    let page = ScriptedPage::new(
        StaticHtmlPage::new().with_document(DEMO_URL, 200, r#"<b class="price">3.00</b>"#),
    )
    .fail_next_wait(timeout("waiting"))
    .fail_next_wait(timeout("waiting"));

    let err = run_one(&page, "demo", &config(&retry_yaml(2), "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Page(ref e) if e.is_timeout()), "got: {err:?}");
    assert_eq!(page.calls_starting_with("goto").len(), 2);
}

#[tokio::test]
async fn retry_does_not_repeat_not_found() {
    let page = ScriptedPage::new(StaticHtmlPage::new().with_document(DEMO_URL, 404, ""));

    let err = run_one(&page, "demo", &config(&retry_yaml(3), "demo"), &target("123"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(page.calls_starting_with("goto").len(), 1);
}

// ---------------------------------------------------------------------------
// ResultRow::set_field
// ---------------------------------------------------------------------------

#[test]
fn set_field_routes_builtin_columns() {
    let mut row = ResultRow::new(DEMO_URL.to_string(), &[]);
    row.set_field("final_price", Some("₪ 1,299.00".to_string()));
    row.set_field("unit_price", Some("₪ 2.50 per 100g".to_string()));
    row.set_field("discount", None);

    assert_eq!(row.final_price.as_deref(), Some("1299.00"));
    assert_eq!(row.unit_price_text.as_deref(), Some("₪ 2.50 per 100g"));
    assert!(!row.discount_flag);
    assert!(row.extra.is_empty());
}
