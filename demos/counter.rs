//! Counter component whose state is driven from outside the component tree

use exposed_state::{expose, use_state, Exposed, LocalState, Registry};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq)]
struct CounterState {
    count: i32,
    step: i32,
}

/// A tiny "component": owns its state, renders on every change.
struct CounterView {
    state: LocalState<CounterState>,
    exposed: Exposed<CounterState>,
}

impl CounterView {
    fn mount(name: &str) -> Self {
        let state = use_state(CounterState { count: 0, step: 1 });
        state.on_render(|s| {
            println!("   [render] count = {}, step = {}", s.count, s.step);
        });
        let exposed = expose(state.clone(), Some(name));
        Self { state, exposed }
    }

    fn click_increment(&self) {
        let (_, set_state) = self.exposed.state();
        set_state.update(|s| CounterState {
            count: s.count + s.step,
            ..s.clone()
        });
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Exposed Counter ===\n");

    println!("1. Mounting counter under key \"counterA\"");
    let view = CounterView::mount("counterA");

    // Devtools side: only the registry is needed.
    let registry = Registry::global();
    println!("   exposed keys: {:?}", registry.keys());

    let Some(entry) = registry.get::<CounterState>("counterA") else {
        eprintln!("counterA is not exposed");
        return;
    };
    let _watch = entry.subscribe(|s| {
        println!("   [devtools] saw count = {}", s.count);
    });

    println!("\n2. Clicking increment twice");
    view.click_increment();
    view.click_increment();
    println!("   registry state: {:?}", entry.state());

    println!("\n3. Devtools sets the step to 5 and increments");
    entry.update(|s| CounterState {
        step: 5,
        ..s.clone()
    });
    view.click_increment();

    println!("\n4. Devtools overwrites the count");
    entry.update(|s| CounterState {
        count: 100,
        ..s.clone()
    });
    println!("   component now renders: {:?}", view.state.get());
    println!("   renders so far: {}", view.state.renders());

    println!("\n5. Unmounting");
    drop(view);
    println!("   counterA exposed: {}", registry.has("counterA"));

    println!("\n✓ Done!");
}
