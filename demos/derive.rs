//! Example demonstrating #[derive(Construct)]
//!
//! Run with:
//!   cargo run --example derive --features derive

use graph_injector::{Construct, Container, Lifespan, Registration, Resolver};
use std::sync::Arc;

struct Database {
    url: String,
}

struct Cache {
    size: usize,
}

trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Audit;

impl Plugin for Audit {
    fn name(&self) -> &'static str {
        "audit"
    }
}

struct Metrics;

impl Plugin for Metrics {
    fn name(&self) -> &'static str {
        "metrics"
    }
}

#[derive(Construct)]
struct UserService {
    #[inject]
    db: Arc<Database>,
    #[inject]
    cache: Arc<Cache>,
    #[inject(list)]
    plugins: Vec<Arc<dyn Plugin>>,
    // Non-injected field uses Default
    request_count: u64,
}

impl UserService {
    fn describe(&self) -> String {
        let plugins: Vec<_> = self.plugins.iter().map(|p| p.name()).collect();
        format!(
            "UserService connected to {} with cache size {} (plugins: {:?}, requests: {})",
            self.db.url, self.cache.size, plugins, self.request_count
        )
    }
}

#[derive(Construct)]
struct ApiController {
    #[inject]
    users: Arc<UserService>,
    #[inject(resolver)]
    resolver: Resolver,
}

fn main() -> graph_injector::Result<()> {
    println!("=== Construct Derive Demo ===\n");

    let container = Container::new();
    container.register(Registration::value(Database {
        url: "postgres://localhost:5432/myapp".into(),
    }))?;
    container.register(Registration::value(Cache { size: 1024 }))?;
    container.register(Registration::instance::<dyn Plugin>(Arc::new(Audit)))?;
    container.register(Registration::instance::<dyn Plugin>(Arc::new(Metrics)))?;
    container.register(Registration::constructor::<UserService>().with_lifespan(Lifespan::Singleton))?;
    container.register(Registration::constructor::<ApiController>())?;

    let controller = container.resolve::<ApiController>()?;
    println!("  {}", controller.users.describe());

    let again = controller.resolver.resolve::<UserService>()?;
    println!("  same singleton through the resolver: {}", Arc::ptr_eq(&again, &controller.users));

    println!("\n=== Demo Complete ===");
    Ok(())
}
