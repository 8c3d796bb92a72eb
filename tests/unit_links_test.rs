use kubalert::config::LinkSetting;
use kubalert::core::rules::links::{LinkValues, render_links};

fn template(name: &str, href: &str) -> LinkSetting {
    LinkSetting {
        name: name.to_string(),
        href: href.to_string(),
    }
}

#[tokio::test]
async fn test_substitutes_all_placeholders() {
    let templates = vec![template(
        "Dashboard",
        "https://grafana/d/pod?ns={{pod_namespace}}&pod={{pod_name}}&node={{node_name}}",
    )];
    let values = LinkValues {
        pod_name: "web-1",
        pod_namespace: "prod",
        node_name: "worker-3",
    };
    let links = render_links(&templates, &values);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].text, "Dashboard");
    assert_eq!(
        links[0].href,
        "https://grafana/d/pod?ns=prod&pod=web-1&node=worker-3"
    );
}

#[tokio::test]
async fn test_drops_unresolved_and_empty_results() {
    let templates = vec![
        template("Broken", "https://x/{{unknown}}"),
        template("Empty", "{{pod_name}}"),
        template("Ok", "https://x/{{node_name}}"),
    ];
    let values = LinkValues {
        pod_name: "",
        pod_namespace: "",
        node_name: "worker-2",
    };
    let links = render_links(&templates, &values);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].text, "Ok");
    assert_eq!(links[0].href, "https://x/worker-2");
}

#[tokio::test]
async fn test_plain_hrefs_pass_through() {
    let templates = vec![template("Runbook", "https://wiki/runbooks/pods")];
    let links = render_links(&templates, &LinkValues::default());
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].href, "https://wiki/runbooks/pods");
}
