//! Counter walkthrough on the in-memory host tree.
//!
//! A counter component owns a count state slot and renders a heading plus
//! two nested children. Each write patches the mounted output in place;
//! once the count reaches its limit the counter renders empty, and one
//! scheduler tick later the cleanup cascade tears the children down with it.
//!
//! Run with `RUST_LOG=debug` to watch containment and cascade decisions.

use std::cell::RefCell;
use std::rc::Rc;

use strand_core::{component, MemoryHost, NodeId, Scope, StateReader, StateWriter};
use strand_runtime_std::StdRuntime;

const COUNT_LIMIT: i32 = 7;

fn text_node(host: &Rc<RefCell<MemoryHost>>, tag: &str, text: &str) -> NodeId {
    let mut host = host.borrow_mut();
    let node = host.create_element(tag);
    if let Err(err) = host.set_text(node, text) {
        log::error!("failed to set text on fresh node: {err}");
    }
    node
}

fn main() {
    env_logger::init();

    let std_runtime = StdRuntime::new();
    let runtime = std_runtime.runtime();
    let host = Rc::new(RefCell::new(MemoryHost::new()));
    runtime.install_host(host.clone());
    let _activation = runtime.enter();

    // Label component: re-renders whenever the counter hands it a new
    // count, and tallies how often its effect observed a change.
    let count_label = {
        let host = host.clone();
        component(move |scope: &Scope<i32>| {
            let count = *scope.props();
            let (tally, set_tally) = scope.update(0);
            let observed = tally.clone();
            scope.execute(count, move |value| {
                log::info!("label observed count {value}");
                set_tally.set(observed.get() + 1);
            });
            scope.cleanup(move |node| log::info!("label cleaned up (node {node})"));
            Some(text_node(
                &host,
                "p",
                &format!("Count: {count} (changes seen: {})", tally.get()),
            ))
        })
    };

    // Static child: same props every render, so its effect fires once for
    // the lifetime of the counter.
    let static_note = {
        let host = host.clone();
        component(move |scope: &Scope<()>| {
            scope.execute((), |_| log::info!("static note mounted"));
            scope.cleanup(move |node| log::info!("static note cleaned up (node {node})"));
            Some(text_node(&host, "p", "static note"))
        })
    };

    let reader_slot: Rc<RefCell<Option<StateReader<i32>>>> = Rc::new(RefCell::new(None));
    let writer_slot: Rc<RefCell<Option<StateWriter<i32, &'static str>>>> =
        Rc::new(RefCell::new(None));

    let counter = {
        let host = host.clone();
        let count_label = count_label.clone();
        let static_note = static_note.clone();
        let reader_slot = reader_slot.clone();
        let writer_slot = writer_slot.clone();
        component(move |scope: &Scope<&'static str>| {
            let (count, set_count) = scope.update(0);
            reader_slot.borrow_mut().replace(count.clone());
            writer_slot.borrow_mut().replace(set_count.clone());

            // runs once for the lifetime of the instance
            scope.execute((), move |_| set_count.set(2));
            scope.execute(count.get(), |value| {
                log::info!("counter is now {value}");
            });
            let host_for_cleanup = host.clone();
            scope.cleanup(move |node| {
                log::info!("counter cleaned up (node {node})");
                if let Err(err) = host_for_cleanup.borrow_mut().remove(node) {
                    log::error!("failed to remove counter subtree: {err}");
                }
            });

            if count.get() >= COUNT_LIMIT {
                return None;
            }

            let label_node = count_label
                .call_keyed(scope.key().to_owned(), count.get())
                .expect("label always renders");
            let note_node = static_note
                .call_keyed(scope.key().to_owned(), ())
                .expect("note always renders");
            let mut host = host.borrow_mut();
            let div = host.create_element("div");
            let heading = host.create_element("h1");
            if let Err(err) = host.set_text(heading, scope.props()) {
                log::error!("failed to set heading text: {err}");
            }
            host.append_child(div, heading).expect("fresh nodes attach");
            host.append_child(div, label_node).expect("fresh nodes attach");
            host.append_child(div, note_node).expect("fresh nodes attach");
            Some(div)
        })
    };

    let body = host.borrow_mut().create_element("body");
    let root = counter.call_keyed("1", "Counter").expect("initial render");
    host.borrow_mut()
        .append_child(body, root)
        .expect("mounting the initial render");
    println!("mounted:\n{}", host.borrow().dump_tree(Some(body)));

    let counter_key = format!("1{}", counter.definition_key());
    while runtime.live_root(&counter_key).is_some() {
        let reader = reader_slot
            .borrow()
            .clone()
            .expect("counter rendered at least once");
        let writer = writer_slot
            .borrow()
            .clone()
            .expect("counter rendered at least once");
        let current = reader.get();
        writer.set(current + 1);

        if std_runtime.take_tick_request() {
            std_runtime.drain_deferred();
        }
        println!("after set({}):\n{}", current + 1, host.borrow().dump_tree(Some(body)));
    }

    println!(
        "counter unmounted; {} node(s) left in the arena",
        host.borrow().len()
    );
}
