//! Per-request scopes with resources, decorators and tagged collections
//!
//! Run with:
//!   cargo run --example request_scope

use graph_injector::filters::registration::has_tag;
use graph_injector::{
    Container, DecoratorRegistration, DependencySettings, Lifespan, Parameter, Registration,
    Resource, ScopeBuilder, Tag,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

struct Config {
    database_url: String,
}

struct Connection {
    id: u64,
}

struct RequestId(u64);

trait Handler: Send + Sync {
    fn handle(&self) -> String;
}

struct Health;

impl Handler for Health {
    fn handle(&self) -> String {
        "ok".into()
    }
}

struct Users {
    connection: Arc<Connection>,
}

impl Handler for Users {
    fn handle(&self) -> String {
        format!("users via connection {}", self.connection.id)
    }
}

struct Timed {
    request: Arc<RequestId>,
    inner: Arc<dyn Handler>,
}

impl Handler for Timed {
    fn handle(&self) -> String {
        format!("[request {}] {}", self.request.0, self.inner.handle())
    }
}

struct Router {
    handlers: Vec<Arc<dyn Handler>>,
}

fn main() -> graph_injector::Result<()> {
    println!("=== Request Scope Demo ===\n");

    let root = Container::new();
    root.register(Registration::value(Config {
        database_url: "postgres://localhost/app".into(),
    }))?;

    root.register(
        Registration::resource(|args| {
            let config = args.get::<Config>("config")?;
            let id = NEXT_REQUEST.fetch_add(1, Ordering::SeqCst);
            println!("  open connection {id} to {}", config.database_url);
            Ok(Resource::new(Connection { id }).with_teardown(move || {
                println!("  close connection {id}");
                Ok(())
            }))
        })
        .param(Parameter::service::<Config>("config"))
        .with_lifespan(Lifespan::Scoped),
    )?;

    root.register(
        Registration::factory::<dyn Handler, _>(|_| Ok(Arc::new(Health)))
            .implementation_type::<Health>()
            .tag(Tag::new("public"))
            .with_lifespan(Lifespan::Scoped),
    )?;
    root.register(
        Registration::factory::<dyn Handler, _>(|args| {
            Ok(Arc::new(Users {
                connection: args.get("connection")?,
            }))
        })
        .param(Parameter::service::<Connection>("connection"))
        .implementation_type::<Users>()
        .tag(Tag::new("private")),
    )?;

    root.register_decorator(
        DecoratorRegistration::factory::<dyn Handler, _>(|args| {
            Ok(Arc::new(Timed {
                request: args.get("request")?,
                inner: args.get("inner")?,
            }))
        })
        .param(Parameter::service::<dyn Handler>("inner"))
        .param(Parameter::service::<RequestId>("request"))
        .implementation_type::<Timed>(),
    )?;

    root.register(
        Registration::factory(|args| Ok(Arc::new(Router { handlers: args.list("handlers")? })))
            .param(Parameter::list::<dyn Handler>("handlers"))
            .with_lifespan(Lifespan::Scoped),
    )?;
    root.expect_to_be_scoped::<RequestId>(None)?;
    root.lock();

    let requests = ScopeBuilder::new().with_value(|| RequestId(NEXT_REQUEST.fetch_add(1, Ordering::SeqCst)));

    for _ in 0..2 {
        let scope = requests.build(&root)?;
        let router = scope.resolve::<Router>()?;
        for handler in &router.handlers {
            println!("  {}", handler.handle());
        }

        let public = scope.resolve_collection::<dyn Handler>(
            graph_injector::CollectionShape::List,
            DependencySettings::new().filter(has_tag("public", None)),
        )?;
        println!("  public handlers: {}", public.len());
        scope.close()?;
        println!();
    }

    let (_, graph) = requests.build(&root)?.guard().resolve_graph::<Router>()?;
    println!("Resolution tree:\n{graph}");

    println!("\n=== Demo Complete ===");
    Ok(())
}
