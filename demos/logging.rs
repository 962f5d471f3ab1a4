//! Example demonstrating logging
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use graph_injector::{Container, DecoratorRegistration, Lifespan, Parameter, Registration, Resource};
use std::sync::Arc;

struct Database {
    url: String,
}

struct UserService {
    db: Arc<Database>,
}

fn main() -> graph_injector::Result<()> {
    graph_injector::logging::builder().trace().pretty().injector_only().init();

    println!("=== Graph Injector Logging Demo ===\n");

    // logs: "Creating new root DI container"
    let container = Container::new();

    // logs: "Registering service"
    container.register(Registration::value(Database {
        url: "postgres://localhost/mydb".into(),
    }))?;
    container.register(
        Registration::factory(|args| Ok(Arc::new(UserService { db: args.get("db")? })))
            .param(Parameter::service::<Database>("db"))
            .with_lifespan(Lifespan::Singleton),
    )?;

    // logs: "Registering decorator"
    container.register_decorator(DecoratorRegistration::wrap::<UserService, _>(|inner| inner))?;

    // logs: "Resolving service", then per-node events at trace
    let users = container.resolve::<UserService>()?;
    println!("  resolved UserService for {}", users.db.url);

    // logs: "Resolving service" and fails with the filter in the message
    assert!(container.try_resolve::<i32>().is_none());

    // logs: "Opening child scope"
    let request = container.new_scope()?;
    request.register(
        Registration::resource(|_| Ok(Resource::new(42u64).with_teardown(|| Ok(()))))
            .with_lifespan(Lifespan::Scoped),
    )?;
    request.resolve::<u64>()?;

    // logs: teardown events on close
    request.close()?;

    // logs: "Container locked - no further registrations allowed"
    container.lock();

    println!("\n=== Demo Complete ===");
    println!("Tip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
    Ok(())
}
