//! Entity construction, bulk update and removal.

use imo_tests::prelude::*;
use pretty_assertions::assert_eq;

#[test]
fn test_simple_fields() {
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);

    let cust = graph.create("Customer", attrs! { "id" => 1 }).unwrap();
    assert_eq!(graph.get(cust, "id").unwrap(), Value::Int(1));
    assert_eq!(graph.get(cust, "name").unwrap(), Value::from("Anonymous"));

    let p1 = graph
        .create("Order", attrs! { "id" => 1, "desc" => "Project1" })
        .unwrap();
    assert_eq!(graph.get(p1, "id").unwrap(), Value::Int(1));
    assert_eq!(graph.get(p1, "desc").unwrap(), Value::from("Project1"));
    assert_eq!(graph.get(p1, "amount").unwrap(), Value::Null);
}

#[test]
fn test_factory_default_is_not_shared() {
    // GIVEN two orders with a list-valued factory default
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);
    let o1 = graph.create("Order", attrs! { "id" => 1 }).unwrap();
    let o2 = graph.create("Order", attrs! { "id" => 2 }).unwrap();

    // WHEN one of them is given lines
    graph
        .set(o1, "lines", Value::List(vec![Value::from("apples")]))
        .unwrap();

    // THEN the other still has its own empty list
    assert_eq!(graph.get(o2, "lines").unwrap(), Value::List(vec![]));
    assert_eq!(graph.get(o2, "status").unwrap(), Value::from("new"));
}

#[test]
fn test_inherited_fields_on_subtype() {
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);

    let o = graph
        .create("Order2", attrs! { "id" => 2, "amount" => 20, "company" => "Company1" })
        .unwrap();

    assert_eq!(graph.get(o, "amount").unwrap(), Value::Int(20));
    assert_eq!(graph.get(o, "company").unwrap(), Value::from("Company1"));
    assert_eq!(graph.get(o, "status").unwrap(), Value::from("new"));
    assert!(graph.is_instance(o, "Order").unwrap());
}

mod update {
    use super::*;

    pub fn scenario() -> Scenario {
        Scenario::new("update")
            .registry(fixtures::commerce)
            .step(
                "spawn",
                |g, b| {
                    let cust = g.create("Customer", attrs! { "id" => 1, "desc" => "Org1" })?;
                    b.bind("cust", cust);
                    b.bind(
                        "o",
                        g.create("Order", attrs! { "id" => 1, "amount" => 10, "customer" => cust })?,
                    );
                    b.bind("o2", g.create("Order", attrs! { "id" => 2, "amount" => 20 })?);
                    Ok(())
                },
                |a| {
                    a.entities(3).check("o under 1", |g, b| {
                        Ok(g.collection(b["cust"], "orders")?.get(1) == Some(b["o"]))
                    })
                },
            )
            .step(
                "update_from_o2",
                |g, b| g.update(b["o"], b["o2"]),
                |a| {
                    a.check("customer kept", |g, b| {
                        Ok(g.get_ref(b["o"], "customer")? == Some(b["cust"]))
                    })
                    .check("re-keyed to 2", |g, b| {
                        let orders = g.collection(b["cust"], "orders")?;
                        Ok(orders.len() == 1 && orders.get(2) == Some(b["o"]))
                    })
                    .check("amount copied", |g, b| Ok(g.get(b["o"], "amount")? == Value::Int(20)))
                    .check("o2 untouched", |g, b| Ok(g.get_ref(b["o2"], "customer")?.is_none()))
                },
            )
    }

    #[test]
    fn test_update_copies_updatable_fields() {
        scenario().run().unwrap();
    }
}

#[test]
fn test_update_skips_fields_source_lacks() {
    // GIVEN an Order2 with a company and a plain Order
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);
    let rich = graph
        .create("Order2", attrs! { "id" => 1, "company" => "Company1" })
        .unwrap();
    let plain = graph
        .create("Order", attrs! { "id" => 7, "amount" => 3 })
        .unwrap();

    // WHEN updating the Order2 from the plain Order
    graph.update(rich, plain).unwrap();

    // THEN shared fields are copied and the company is kept
    assert_eq!(graph.get(rich, "id").unwrap(), Value::Int(7));
    assert_eq!(graph.get(rich, "amount").unwrap(), Value::Int(3));
    assert_eq!(graph.get(rich, "company").unwrap(), Value::from("Company1"));
}

#[test]
fn test_update_respects_non_updatable_key() {
    let mut builder = RegistryBuilder::new();
    builder
        .add_type("Account")
        .field(FieldDef::scalar("number").key().updatable(false))
        .field(FieldDef::scalar("balance"))
        .done()
        .unwrap();
    let registry = builder.build().unwrap();
    let mut graph = Graph::new(&registry);
    let a = graph
        .create("Account", attrs! { "number" => 1, "balance" => 10 })
        .unwrap();
    let b = graph
        .create("Account", attrs! { "number" => 2, "balance" => 99 })
        .unwrap();

    graph.update(a, b).unwrap();

    assert_eq!(graph.get(a, "number").unwrap(), Value::Int(1));
    assert_eq!(graph.get(a, "balance").unwrap(), Value::Int(99));
}

#[test]
fn test_failed_update_changes_nothing() {
    // GIVEN an item in a bin, and a loose source item whose key cannot key a
    // collection
    let mut builder = RegistryBuilder::new();
    builder
        .add_type("Bin")
        .field(FieldDef::scalar("label").key())
        .field(FieldDef::collection("items", "Item").reverse("container"))
        .done()
        .unwrap();
    builder
        .add_type("Item")
        .field(FieldDef::scalar("note"))
        .field(FieldDef::scalar("sku").key())
        .field(FieldDef::reference("container", "Bin").reverse("items"))
        .done()
        .unwrap();
    let registry = builder.build().unwrap();
    let mut graph = Graph::new(&registry);
    let bin = graph.create("Bin", attrs! { "label" => "A" }).unwrap();
    let item = graph
        .create("Item", attrs! { "note" => "old", "sku" => "a", "container" => bin })
        .unwrap();
    let source = graph
        .create("Item", attrs! { "note" => "new", "sku" => 1.5 })
        .unwrap();

    // WHEN the note copies but the key does not
    let err = graph.update(item, source).unwrap_err();

    // THEN the note is restored too
    assert!(matches!(err, GraphError::UnkeyableValue { .. }));
    assert_eq!(graph.get(item, "note").unwrap(), Value::from("old"));
    assert_eq!(graph.get(item, "sku").unwrap(), Value::from("a"));
    assert_eq!(graph.collection(bin, "items").unwrap().get("a"), Some(item));
}

mod rollback {
    use super::*;

    pub fn scenario() -> Scenario {
        Scenario::new("rollback")
            .registry(fixtures::people)
            .step(
                "spawn",
                |g, b| {
                    b.bind("a", g.create("Person", attrs! { "name" => "a" })?);
                    b.bind("car", g.create("Car", attrs! { "plate" => "AB-12" })?);
                    Ok(())
                },
                |a| a.entities(2),
            )
            .step(
                "unknown_field",
                |g, _| g.create("Person", attrs! { "name" => "x", "age" => 3 }).map(|_| ()),
                |a| a.error("Unknown field: age").entities(2),
            )
            .step(
                "bad_value_after_attach",
                |g, b| {
                    g.create(
                        "Person",
                        attrs! { "name" => "b", "spouse" => b["a"], "passport" => b["car"] },
                    )
                    .map(|_| ())
                },
                |a| {
                    a.error("Invalid reference class")
                        .entities(2)
                        .check("a is single again", |g, b| {
                            Ok(g.get_ref(b["a"], "spouse")?.is_none())
                        })
                },
            )
            .step(
                "marry",
                |g, b| {
                    b.bind("c", g.create("Person", attrs! { "name" => "c", "spouse" => b["a"] })?);
                    Ok(())
                },
                |a| {
                    a.entities(3).check("a and c married", |g, b| {
                        Ok(g.get_ref(b["a"], "spouse")? == Some(b["c"]))
                    })
                },
            )
            .step(
                "steal_then_fail",
                |g, b| {
                    g.create(
                        "Person",
                        attrs! { "name" => "d", "spouse" => b["a"], "passport" => b["car"] },
                    )
                    .map(|_| ())
                },
                |a| {
                    a.error("Invalid reference class")
                        .entities(3)
                        .check("a still married to c", |g, b| {
                            Ok(g.get_ref(b["a"], "spouse")? == Some(b["c"]))
                        })
                        .check("c still married to a", |g, b| {
                            Ok(g.get_ref(b["c"], "spouse")? == Some(b["a"]))
                        })
                },
            )
    }

    #[test]
    fn test_failed_construction_leaves_no_trace() {
        scenario().run().unwrap();
    }
}

#[test]
fn test_rejected_collection_value_rolls_back() {
    // GIVEN an unattached order and a product
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);
    let o = graph.create("Order", attrs! { "id" => 1 }).unwrap();
    let p = graph.create("Product", attrs! { "sku" => "P" }).unwrap();

    // WHEN a customer is built with both as its orders
    let result = graph.create("Customer", attrs! { "id" => 2, "orders" => vec![o, p] });

    // THEN it is rejected before anything is linked
    assert!(matches!(result, Err(GraphError::TypeMismatch { .. })));
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.get_ref(o, "customer").unwrap(), None);
}

#[test]
fn test_remove_unlinks_both_sides() {
    // GIVEN c with two orders
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);
    let c = graph.create("Customer", attrs! { "id" => 1 }).unwrap();
    let o1 = graph.create("Order", attrs! { "id" => 1, "customer" => c }).unwrap();
    let o2 = graph.create("Order", attrs! { "id" => 2, "customer" => c }).unwrap();

    // WHEN removing an order
    graph.remove(o1).unwrap();

    // THEN it is gone from the collection and the graph
    assert!(!graph.contains(o1));
    assert_eq!(graph.get(c, "orders").unwrap(), Value::from(vec![o2]));
    assert_eq!(graph.entities_of_type("Order").unwrap(), vec![o2]);

    // WHEN removing the customer
    graph.remove(c).unwrap();

    // THEN the remaining order is detached
    assert_eq!(graph.get_ref(o2, "customer").unwrap(), None);
    assert!(matches!(
        graph.remove(c),
        Err(GraphError::EntityNotFound(_))
    ));
}

#[test]
fn test_entities_of_type_includes_subtypes() {
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);
    let o1 = graph.create("Order", attrs! { "id" => 1 }).unwrap();
    let o2 = graph.create("Order2", attrs! { "id" => 2 }).unwrap();
    graph.create("Customer", attrs! { "id" => 1 }).unwrap();

    assert_eq!(graph.entities_of_type("Order").unwrap(), vec![o1, o2]);
    assert_eq!(graph.entities_of_type("Order2").unwrap(), vec![o2]);
    assert!(matches!(
        graph.entities_of_type("Ghost"),
        Err(GraphError::UnknownType { .. })
    ));
}
