//! エンコーダのワイヤ出力テスト

use bytes::Bytes;
use flight_server::{
    render_to_stream, render_to_vec, render_to_writer, Component, ComponentError, Element, Node,
    Reference, RenderError, RenderOptions, RenderStream, Suspense,
};
use futures::channel::oneshot;
use futures::StreamExt;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn render(root: impl Into<Node>, options: RenderOptions) -> String {
    let bytes = render_to_vec(root.into(), options).await.unwrap();
    String::from_utf8(bytes).unwrap()
}

fn client_options() -> RenderOptions {
    RenderOptions::new().with_client_reference_data(|identity| {
        let (id, name) = identity.split_once('#')?;
        Some(json!({ "id": id, "name": name }))
    })
}

/// oneshot が届くまで解決しないテキストノード
fn text_after(rx: oneshot::Receiver<()>, text: &'static str) -> Node {
    Node::future(async move {
        rx.await?;
        Ok::<Node, ComponentError>(text.into())
    })
}

async fn next_line(stream: &mut RenderStream) -> String {
    let chunk: Bytes = stream.next().await.unwrap().unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

#[tokio::test]
async fn test_basic_element() {
    init_tracing();
    let out = render(Element::new("div").child("Hello world!"), RenderOptions::new()).await;
    assert_eq!(out, "J0:[\"$\",\"div\",null,{\"children\":[\"Hello world!\"]}]\n");
}

#[tokio::test]
async fn test_nested_element_with_renamed_class() {
    let root = Element::new("div")
        .prop("className", "outer")
        .child(Element::new("span").child("inner"));
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(
        out,
        "J0:[\"$\",\"div\",null,{\"class\":\"outer\",\"children\":[[\"$\",\"span\",null,{\"children\":[\"inner\"]}]]}]\n"
    );
}

#[tokio::test]
async fn test_renamed_props_follow_untouched_props() {
    let root = Element::new("label")
        .prop("className", "field")
        .prop("id", "name-label")
        .prop("htmlFor", "name");
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(
        out,
        "J0:[\"$\",\"label\",null,{\"id\":\"name-label\",\"class\":\"field\",\"for\":\"name\",\"children\":[]}]\n"
    );
}

#[tokio::test]
async fn test_node_valued_prop_is_encoded() {
    let root = Element::new("button").node_prop("icon", Element::new("svg"));
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(
        out,
        "J0:[\"$\",\"button\",null,{\"icon\":[\"$\",\"svg\",null,{\"children\":[]}],\"children\":[]}]\n"
    );
}

#[tokio::test]
async fn test_suspense_without_suspension() {
    let root = Suspense::new()
        .fallback("Loading...")
        .child(Element::new("div").child("Hello world!"));
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(
        out,
        concat!(
            "S2:\"Suspense\"\n",
            "S3:\"Fragment\"\n",
            "J0:[\"$\",\"$2\",[\"$\",\"$3\",null,{\"children\":[\"Loading...\"]}],",
            "{\"children\":[[\"$\",\"div\",null,{\"children\":[\"Hello world!\"]}]]}]\n",
        )
    );
}

#[tokio::test]
async fn test_suspense_with_async_child_emits_hole() {
    let child = Node::future(async {
        Ok::<Node, ComponentError>(Element::new("div").child("Hello world!").into())
    });
    let root = Suspense::new().fallback("Loading...").child(child);
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(
        out,
        concat!(
            "S2:\"Suspense\"\n",
            "S3:\"Fragment\"\n",
            "J0:[\"$\",\"$2\",[\"$\",\"$3\",null,{\"children\":[\"Loading...\"]}],",
            "{\"children\":[[\"$\",\"@1\",null,{}]]}]\n",
            "J1:[\"$\",\"$3\",null,{\"children\":[[\"$\",\"div\",null,{\"children\":[\"Hello world!\"]}]]}]\n",
        )
    );
}

#[tokio::test]
async fn test_holes_fill_in_completion_order() {
    init_tracing();
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let root = Element::new("div")
        .child(Suspense::new().fallback("A...").child(text_after(rx_a, "a")))
        .child(Suspense::new().fallback("B...").child(text_after(rx_b, "b")));

    let mut stream = render_to_stream(root.into(), RenderOptions::new());
    let mut lines = Vec::new();
    for _ in 0..3 {
        lines.push(next_line(&mut stream).await);
    }
    // 後に宣言された境界を先に解決する
    tx_b.send(()).unwrap();
    lines.push(next_line(&mut stream).await);
    tx_a.send(()).unwrap();
    lines.push(next_line(&mut stream).await);
    assert!(stream.next().await.is_none());

    assert_eq!(
        lines,
        vec![
            "S2:\"Suspense\"\n".to_string(),
            "S3:\"Fragment\"\n".to_string(),
            concat!(
                "J0:[\"$\",\"div\",null,{\"children\":[",
                "[\"$\",\"$2\",[\"$\",\"$3\",null,{\"children\":[\"A...\"]}],{\"children\":[[\"$\",\"@1\",null,{}]]}],",
                "[\"$\",\"$2\",[\"$\",\"$3\",null,{\"children\":[\"B...\"]}],{\"children\":[[\"$\",\"@4\",null,{}]]}]",
                "]}]\n"
            )
            .to_string(),
            "J4:[\"$\",\"$3\",null,{\"children\":[\"b\"]}]\n".to_string(),
            "J1:[\"$\",\"$3\",null,{\"children\":[\"a\"]}]\n".to_string(),
        ]
    );
}

/// 外側の境界の子に、非同期で現れる内側の境界を入れる
fn nested_boundaries(inner: Node, after: Node) -> Suspense {
    let inner_boundary = Node::future(async move {
        Ok::<Node, ComponentError>(Suspense::new().fallback("inner...").child(inner).into())
    });
    Suspense::new()
        .fallback("outer...")
        .child(inner_boundary)
        .child(after)
}

#[tokio::test]
async fn test_nested_fill_waits_for_outer_fill() {
    init_tracing();
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let root = nested_boundaries(text_after(rx_a, "a"), text_after(rx_b, "b"));

    let mut stream = render_to_stream(root.into(), RenderOptions::new());
    let mut lines = Vec::new();
    for _ in 0..3 {
        lines.push(next_line(&mut stream).await);
    }
    // 内側が先に揃っても、@3 を含む J1 より前には出ない
    tx_a.send(()).unwrap();
    assert!(futures::poll!(stream.next()).is_pending());
    tx_b.send(()).unwrap();
    lines.push(next_line(&mut stream).await);
    lines.push(next_line(&mut stream).await);
    assert!(stream.next().await.is_none());

    assert_eq!(
        lines,
        vec![
            "S2:\"Suspense\"\n".to_string(),
            "S4:\"Fragment\"\n".to_string(),
            concat!(
                "J0:[\"$\",\"$2\",[\"$\",\"$4\",null,{\"children\":[\"outer...\"]}],",
                "{\"children\":[[\"$\",\"@1\",null,{}]]}]\n"
            )
            .to_string(),
            concat!(
                "J1:[\"$\",\"$4\",null,{\"children\":[",
                "[\"$\",\"$2\",[\"$\",\"$4\",null,{\"children\":[\"inner...\"]}],{\"children\":[[\"$\",\"@3\",null,{}]]}],",
                "\"b\"",
                "]}]\n"
            )
            .to_string(),
            "J3:[\"$\",\"$4\",null,{\"children\":[\"a\"]}]\n".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_nested_fill_dropped_when_outer_fails() {
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel::<()>();
    let failing = Node::future(async move {
        rx_b.await?;
        Err::<Node, ComponentError>("outer failed".into())
    });
    let root = nested_boundaries(text_after(rx_a, "a"), failing);

    let mut stream = render_to_stream(root.into(), RenderOptions::new());
    for _ in 0..3 {
        next_line(&mut stream).await;
    }
    tx_a.send(()).unwrap();
    tx_b.send(()).unwrap();
    assert_eq!(
        next_line(&mut stream).await,
        "E1:{\"message\":\"Component failed: outer failed\"}\n"
    );
    // @3 は送られていないので J3 も出ない
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_client_reference() {
    let root = Reference::new("/client.js#Client").child(Element::new("div").child("Hello world!"));
    let out = render(root, client_options()).await;
    assert_eq!(
        out,
        concat!(
            "M1:{\"id\":\"/client.js\",\"name\":\"Client\"}\n",
            "J0:[\"$\",\"@1\",null,{\"children\":[[\"$\",\"div\",null,{\"children\":[\"Hello world!\"]}]]}]\n",
        )
    );
}

#[tokio::test]
async fn test_client_reference_props_pass_through() {
    let root = Reference::new("/counter.js#Counter").prop("initial", 3);
    let out = render(root, client_options()).await;
    assert_eq!(
        out,
        concat!(
            "M1:{\"id\":\"/counter.js\",\"name\":\"Counter\"}\n",
            "J0:[\"$\",\"@1\",null,{\"initial\":3,\"children\":[]}]\n",
        )
    );
}

#[tokio::test]
async fn test_reference_without_hook_fails() {
    let root = Element::new("div").child(Reference::new("/client.js#Client"));
    let items: Vec<_> = render_to_stream(root.into(), RenderOptions::new()).collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(&items[0], Err(RenderError::Configuration(_))));
}

#[tokio::test]
async fn test_declarations_are_deduplicated() {
    let root = Element::new("main")
        .child(Reference::new("/client.js#Client"))
        .child(Reference::new("/client.js#Client"))
        .child(Suspense::new().child("one"))
        .child(Suspense::new().child("two"));
    let out = render(root, client_options()).await;
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines.iter().filter(|l| l.starts_with("M1:")).count(), 1);
    assert_eq!(lines.iter().filter(|l| l.starts_with('S')).count(), 2);
    assert_eq!(lines.iter().filter(|l| l.starts_with('J')).count(), 1);
    assert_eq!(out.matches("\"@1\"").count(), 2);
}

#[tokio::test]
async fn test_function_component() {
    let name = String::from("world");
    let root = Component::function("Greeting", move || {
        Element::new("p").child(format!("Hello {name}!")).into()
    });
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(out, "J0:[\"$\",\"p\",null,{\"children\":[\"Hello world!\"]}]\n");
}

#[tokio::test]
async fn test_stateful_component_is_unsupported() {
    let root = Element::new("div").child(Component::stateful("Counter"));
    let result = render_to_vec(root.into(), RenderOptions::new()).await;
    assert!(matches!(result, Err(RenderError::UnsupportedNode(msg)) if msg.contains("Counter")));
}

#[tokio::test]
async fn test_failed_subtree_emits_error_chunk() {
    let failing = Node::future(async { Err::<Node, ComponentError>("database unavailable".into()) });
    let root = Element::new("div")
        .child(Suspense::new().fallback("Loading...").child(failing))
        .child("after");
    let out = render(root, RenderOptions::new()).await;
    let lines: Vec<&str> = out.lines().collect();

    assert!(lines[2].starts_with("J0:"));
    assert!(lines[2].contains("\"after\""));
    assert_eq!(
        lines.last(),
        Some(&"E1:{\"message\":\"Component failed: database unavailable\"}")
    );
}

#[tokio::test]
async fn test_failure_outside_boundary_is_fatal() {
    let failing = Node::future(async { Err::<Node, ComponentError>("boom".into()) });
    let result = render_to_vec(Element::new("div").child(failing).into(), RenderOptions::new()).await;
    assert!(matches!(result, Err(RenderError::Component(_))));
}

#[tokio::test]
async fn test_render_to_writer() {
    let mut out: Vec<u8> = Vec::new();
    render_to_writer(Element::new("div").child("Hello world!").into(), RenderOptions::new(), &mut out)
        .await
        .unwrap();
    assert_eq!(out, b"J0:[\"$\",\"div\",null,{\"children\":[\"Hello world!\"]}]\n");
}

#[tokio::test]
async fn test_fragment_and_primitives() {
    let root = Node::fragment([Node::from("text"), Node::from(42i64), Node::from(true), Node::null()]);
    let out = render(root, RenderOptions::new()).await;
    assert_eq!(
        out,
        "S1:\"Fragment\"\nJ0:[\"$\",\"$1\",null,{\"children\":[\"text\",42,true,null]}]\n"
    );
}
