use anyhow::Context;
use trellis_core::*;
use trellis_router::{History, Location, RouteRecord, Router, link, use_route};

/// Prints each committed tree to stdout, indented.
struct PrintRenderer;

impl Renderer for PrintRenderer {
    fn commit(&mut self, root: &CommittedNode) {
        println!("--- commit ---");
        print_node(root, 0);
    }
}

fn print_node(node: &CommittedNode, depth: usize) {
    let pad = "  ".repeat(depth);
    match &node.kind {
        CommittedKind::Element { tag } => println!("{pad}<{tag}#{}>", node.id),
        CommittedKind::Text { text } => println!("{pad}{text:?}"),
    }
    for c in &node.children {
        print_node(c, depth + 1);
    }
}

fn counter() -> std::rc::Rc<ComponentDef> {
    ComponentDef::new("Counter", |ctx| {
        let (count, set_count) = ctx.use_state(|| Value::Int(0));
        let n = count.as_int().unwrap_or(0);

        // Runs again only when the count actually changed.
        ctx.use_effect(deps!(n), move || {
            log::info!("count is now {n}");
            Ok(None)
        });

        Ok(vec![
            Node::element("button")
                .prop(
                    "on_click",
                    Value::handler(move |_| {
                        set_count.set_with(|prev, _| {
                            Value::Int(prev.as_int().unwrap_or(0) + 1)
                        });
                    }),
                )
                .child(Node::text(format!("Count = {n}"))),
        ])
    })
}

fn name_form() -> std::rc::Rc<ComponentDef> {
    ComponentDef::new("NameForm", |ctx| {
        let (name, set_name) = ctx.use_state(|| Value::Str(String::new()));
        let current = name.as_str().unwrap_or("").to_string();

        // Controlled input: the field shows state, the handler writes it back.
        Ok(vec![
            Node::element("input")
                .prop("value", current.clone())
                .prop(
                    "on_input",
                    Value::handler(move |payload| {
                        if let Some(s) = payload.as_str() {
                            set_name.set(s);
                        }
                    }),
                ),
            Node::text(if current.is_empty() {
                "Hello, stranger".to_string()
            } else {
                format!("Hello, {current}")
            }),
        ])
    })
}

fn app(history: &History) -> std::rc::Rc<ComponentDef> {
    let history = history.clone();
    let router = Router::new(vec![
        RouteRecord::new("/").exact(),
        RouteRecord::new("/user/:id").exact(),
        RouteRecord::new("/404"),
    ])
    .with_fallback(2);

    let counter = counter();
    let form = name_form();

    ComponentDef::new("App", move |ctx| {
        let (_, matched) = use_route(ctx, &router, &history);

        let body = match matched {
            Some(m) if m.path == "/user/:id" => {
                vec![Node::text(format!("Profile of user {}", m.params["id"]))]
            }
            Some(m) if m.is_exact => vec![
                Node::component(&counter, Props::new()),
                Node::component(&form, Props::new()),
            ],
            _ => vec![Node::text("Not found")],
        };

        let mut out = vec![
            link(&history, "/", "Home").keyed("home"),
            link(&history, "/user/7", "User 7").keyed("user"),
        ];
        out.extend(body);
        Ok(out)
    })
}

fn tag_ids(tree: &CommittedNode, tag: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    collect_tag_ids(tree, tag, &mut out);
    out
}

fn collect_tag_ids(node: &CommittedNode, tag: &str, out: &mut Vec<NodeId>) {
    if let CommittedKind::Element { tag: t } = &node.kind
        && t == tag
    {
        out.push(node.id);
    }
    for c in &node.children {
        collect_tag_ids(c, tag, out);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let history = History::with_initial(Location::new("/"));
    let rt = Runtime::with_renderer(Box::new(PrintRenderer));
    rt.set_warning_hook(|msg| log::warn!("runtime: {msg}"));

    rt.mount(Node::component(&app(&history), Props::new()))?;

    let tree = rt.committed().context("no committed tree after mount")?;
    let button = tree
        .find_by_tag("button")
        .context("counter button missing")?
        .id;
    rt.dispatch(button, "on_click", Value::Null);
    rt.dispatch(button, "on_click", Value::Null);

    let tree = rt.committed().context("no committed tree")?;
    let input = tree.find_by_tag("input").context("name input missing")?.id;
    rt.dispatch(input, "on_input", Value::from("Ada"));

    // Navigate to the user view through the second link.
    let tree = rt.committed().context("no committed tree")?;
    let links = tag_ids(&tree, "a");
    let user_link = *links.get(1).context("user link missing")?;
    rt.dispatch(user_link, "on_click", Value::Null);

    history.back();

    let texts = rt.committed().context("no committed tree")?.texts();
    println!("final: {texts:?}");
    Ok(())
}
