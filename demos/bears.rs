//! Bear counter: a store with actions, bound to effects through tracked slices

use serde::{Deserialize, Serialize};
use tincan_bind::runtime::create_root;
use tincan_bind::{create, create_effect, StoreSetter};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Bear {
    id: u32,
    name: String,
    hungry: bool,
}

// Only slices of the forest are tracked, so the state itself needs no serde impls
#[derive(Clone)]
struct Forest {
    bears: Vec<Bear>,
    visitors: u32,
    actions: Option<Actions>,
}

#[derive(Clone)]
struct Actions {
    setter: StoreSetter<Forest>,
}

impl Actions {
    fn add_bear(&self, name: &str) {
        let name = name.to_string();
        let _ = self.setter.update(move |forest| {
            let id = forest.bears.len() as u32 + 1;
            forest.bears.push(Bear {
                id,
                name,
                hungry: true,
            });
        });
    }

    fn feed(&self, id: u32) {
        let _ = self.setter.update(|forest| {
            if let Some(bear) = forest.bears.iter_mut().find(|bear| bear.id == id) {
                bear.hungry = false;
            }
        });
    }

    fn visit(&self) {
        let _ = self.setter.update(|forest| forest.visitors += 1);
    }
}

fn main() {
    println!("=== Bear Forest ===\n");

    let forest = create(|setter| Forest {
        bears: vec![],
        visitors: 0,
        actions: Some(Actions {
            setter: setter.clone(),
        }),
    });

    let Some(actions) = forest.get_state().actions.clone() else {
        return;
    };

    let scope = create_root(|scope| {
        // Re-runs whenever any bear changes; visitors are not part of the slice
        let bears = forest
            .select(|forest: &Forest| forest.bears.clone())
            .expect("bears slice serializes");
        create_effect(move || {
            if let Ok(bears) = bears.get() {
                println!("[bears] {:?}", bears.iter().map(|b| &b.name).collect::<Vec<_>>());
            }
        });

        // Only re-runs when the hungry count changes
        let hungry = forest
            .select_with(
                |forest: &Forest| forest.bears.iter().filter(|b| b.hungry).count(),
                |a, b| a == b,
            )
            .expect("hungry count serializes");
        create_effect(move || {
            if let Ok(count) = hungry.get() {
                println!("[hungry] {count}");
            }
        });

        scope
    });

    println!("\nAdding bears...");
    actions.add_bear("Bruno");
    actions.add_bear("Ursula");

    println!("\nA visitor arrives (no bear effect should run)...");
    actions.visit();

    println!("\nFeeding Bruno...");
    actions.feed(1);

    scope.dispose();
    println!("\nScope disposed; further updates are not observed.");
    actions.feed(2);
}
