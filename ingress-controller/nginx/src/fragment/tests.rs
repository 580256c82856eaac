use super::*;

fn port(p: u16) -> NonZeroU16 {
    NonZeroU16::new(p).unwrap()
}

fn backend(s: &str) -> Backend {
    s.parse().unwrap()
}

fn acme() -> TenantId {
    "acme".parse().unwrap()
}

const ACME_8042: &str = "\
# tenant: acme
upstream tcp_8042 {
    server 10.0.0.5:31090;
}

upstream udp_8042 {
    server 10.0.0.5:31090;
}

server {
    listen 8042;
    proxy_connect_timeout 5s;
    proxy_timeout 10m;
    proxy_pass tcp_8042;
}

server {
    listen 8042 udp;
    proxy_connect_timeout 5s;
    proxy_timeout 10m;
    proxy_pass udp_8042;
}
";

#[test]
fn renders_new_stream() {
    let text = synthesize_stream(
        None,
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Absent,
    )
    .unwrap();
    assert_eq!(text, ACME_8042);
}

#[test]
fn stream_synthesis_is_idempotent() {
    let first = synthesize_stream(
        None,
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Absent,
    )
    .unwrap();
    let second = synthesize_stream(
        Some(&first),
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Absent,
    )
    .unwrap();
    assert_eq!(first, second);
    assert_eq!(second.matches("server 10.0.0.5:31090;").count(), 2);
}

#[test]
fn merges_backends_sorted_and_deduplicated() {
    let existing = StreamFragment::builder(port(8042))
        .tenant(acme())
        .backend(backend("10.0.0.7:31000"))
        .backend(backend("10.0.0.5:31090"))
        .build()
        .to_string();

    // C is new.
    let merged = synthesize_stream(
        Some(&existing),
        &acme(),
        port(8042),
        backend("10.0.0.6:31095"),
        Secondary::Absent,
    )
    .unwrap();
    let tcp = parse::stream(&merged).unwrap().upstreams.remove(0);
    assert_eq!(tcp.role, parse::Role::Tcp);
    assert_eq!(
        tcp.backends.into_iter().collect::<Vec<_>>(),
        [
            backend("10.0.0.5:31090"),
            backend("10.0.0.6:31095"),
            backend("10.0.0.7:31000")
        ]
    );

    // C == A.
    let unchanged = synthesize_stream(
        Some(&existing),
        &acme(),
        port(8042),
        backend("10.0.0.7:31000"),
        Secondary::Absent,
    )
    .unwrap();
    assert_eq!(unchanged, existing);
}

#[test]
fn redeploy_keeps_previous_backend() {
    let merged = synthesize_stream(
        Some(ACME_8042),
        &acme(),
        port(8042),
        backend("10.0.0.5:31095"),
        Secondary::Absent,
    )
    .unwrap();
    let parsed = parse::stream(&merged).unwrap();
    assert_eq!(parsed.upstreams.len(), 2);
    for upstream in parsed.upstreams {
        assert_eq!(
            upstream.backends.into_iter().collect::<Vec<_>>(),
            [backend("10.0.0.5:31090"), backend("10.0.0.5:31095")]
        );
    }
}

#[test]
fn renders_secondary_listener() {
    let text = synthesize_stream(
        None,
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Add(port(8043), backend("10.0.0.5:31091")),
    )
    .unwrap();
    assert!(text.starts_with(ACME_8042));
    assert_eq!(
        &text[ACME_8042.len()..],
        "
upstream api_8043 {
    server 10.0.0.5:31091;
}

server {
    listen 8043;
    proxy_connect_timeout 5s;
    proxy_timeout 10m;
    proxy_pass api_8043;
}
"
    );

    // The secondary survives a re-provision that can't resolve it, and its backends stay
    // separate from the primary's.
    let merged = synthesize_stream(
        Some(&text),
        &acme(),
        port(8042),
        backend("10.0.0.5:31095"),
        Secondary::Retain(port(8043)),
    )
    .unwrap();
    let fragment = parse::stream(&merged).unwrap();
    let api = fragment
        .upstreams
        .iter()
        .find(|u| u.role == parse::Role::Api)
        .unwrap();
    assert_eq!(api.port, port(8043));
    assert_eq!(api.backends.len(), 1);
}

#[test]
fn drops_secondary_listener_no_longer_planned() {
    let text = synthesize_stream(
        None,
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Add(port(8043), backend("10.0.0.5:31091")),
    )
    .unwrap();

    let redeployed = synthesize_stream(
        Some(&text),
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Absent,
    )
    .unwrap();
    assert_eq!(redeployed, ACME_8042);
}

#[test]
fn moves_secondary_listener_to_new_port() {
    let text = synthesize_stream(
        None,
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Add(port(8043), backend("10.0.0.5:31091")),
    )
    .unwrap();

    let moved = synthesize_stream(
        Some(&text),
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Add(port(8044), backend("10.0.0.5:31092")),
    )
    .unwrap();
    let api = parse::stream(&moved)
        .unwrap()
        .upstreams
        .into_iter()
        .find(|u| u.role == parse::Role::Api)
        .unwrap();
    assert_eq!(api.port, port(8044));
    assert_eq!(
        api.backends.into_iter().collect::<Vec<_>>(),
        [backend("10.0.0.5:31092")]
    );
    assert!(!moved.contains("8043"));
}

#[test]
fn refuses_foreign_fragment() {
    let beta = ACME_8042.replace("# tenant: acme", "# tenant: beta");
    let err = synthesize_stream(
        Some(&beta),
        &acme(),
        port(8042),
        backend("10.0.0.5:31095"),
        Secondary::Absent,
    )
    .unwrap_err();
    assert_eq!(
        err,
        FragmentError::ForeignOwner {
            port: port(8042),
            owner: "beta".parse().unwrap(),
        }
    );
}

#[test]
fn adopts_unmarked_fragment() {
    let legacy = "upstream tcp_8042 {\n    server 10.0.0.9:30000 max_fails=3;\n}\n";
    let text = synthesize_stream(
        Some(legacy),
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Absent,
    )
    .unwrap();
    assert_eq!(owner(&text), Some(acme()));
    assert!(text.contains("server 10.0.0.9:30000;"));
}

#[test]
fn rejects_unparseable_backend() {
    let broken = "# tenant: acme\nupstream tcp_8042 {\n    server 10.0.0.5:http;\n}\n";
    let err = synthesize_stream(
        Some(broken),
        &acme(),
        port(8042),
        backend("10.0.0.5:31090"),
        Secondary::Absent,
    )
    .unwrap_err();
    assert!(matches!(err, FragmentError::Backend { line: 3, .. }), "{err}");
}

#[test]
fn parse_backend() {
    assert_eq!(
        backend("10.0.0.5:31090"),
        Backend {
            host: "10.0.0.5".to_string(),
            port: port(31090)
        }
    );
    assert_eq!(backend("[::1]:8080").host, "[::1]");
    assert!("10.0.0.5".parse::<Backend>().is_err());
    assert!("10.0.0.5:0".parse::<Backend>().is_err());
    assert!(":80".parse::<Backend>().is_err());
}

#[test]
fn renders_http_location() {
    let text = synthesize_http(&acme(), port(80), backend("10.0.0.5:31100"), "/acme/").unwrap();
    assert_eq!(
        text,
        "\
# tenant: acme
# public port: 80
location /acme/ {
    proxy_pass http://10.0.0.5:31100/;
    proxy_set_header Host $host;
    proxy_set_header X-Real-IP $remote_addr;
    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
    proxy_set_header X-Forwarded-Proto $scheme;
}
"
    );
    assert_eq!(
        synthesize_http(&acme(), port(80), backend("10.0.0.5:31100"), "acme").unwrap(),
        text
    );
}

#[test]
fn rejects_invalid_location_paths() {
    for path in ["", "/", "a b", "../etc", "acme//web", "acme;", "acme{"] {
        assert_eq!(
            synthesize_http(&acme(), port(80), backend("10.0.0.5:31100"), path),
            Err(FragmentError::InvalidPath(path.to_string())),
            "{path:?}"
        );
    }
}

#[test]
fn fragment_owner() {
    assert_eq!(owner(ACME_8042), Some(acme()));
    assert_eq!(owner("upstream tcp_1 {}"), None);

    let location = HttpLocation::new(acme(), port(80), backend("10.0.0.5:1"), "acme").unwrap();
    let fragment = ProxyFragment::from(location.clone());
    assert_eq!(fragment.tenant(), Some(&acme()));
    assert_eq!(owner(&fragment.to_string()), Some(acme()));
    assert_eq!(location.path(), "/acme/");
}
