//! Reference fields and their reverse side.

use imo_tests::prelude::*;
use pretty_assertions::assert_eq;

/// Entries of `customer.orders`, sorted by key.
fn orders_of(g: &Graph<'_>, customer: EntityId) -> GraphResult<Vec<(Key, EntityId)>> {
    let mut entries: Vec<(Key, EntityId)> = g
        .collection(customer, "orders")?
        .iter()
        .map(|(key, id)| (key.clone(), id))
        .collect();
    entries.sort();
    Ok(entries)
}

mod reassignment {
    use super::*;

    pub fn scenario() -> Scenario {
        Scenario::new("reassignment")
            .registry(fixtures::commerce)
            .step(
                "spawn_customers_and_order",
                |g, b| {
                    b.bind("c1", g.create("Customer", attrs! { "id" => 1 })?);
                    b.bind("c2", g.create("Customer", attrs! { "id" => 2 })?);
                    b.bind("o", g.create("Order", attrs! { "id" => 1 })?);
                    Ok(())
                },
                |a| a.entities(3),
            )
            .step(
                "attach_to_c1",
                |g, b| g.set(b["o"], "customer", b["c1"]),
                |a| {
                    a.check("c1 holds o under 1", |g, b| {
                        Ok(orders_of(g, b["c1"])? == vec![(Key::Int(1), b["o"])])
                    })
                },
            )
            .step(
                "move_to_c2",
                |g, b| g.set(b["o"], "customer", b["c2"]),
                |a| {
                    a.check("c1 is empty", |g, b| Ok(orders_of(g, b["c1"])?.is_empty()))
                        .check("c2 holds o under 1", |g, b| {
                            Ok(orders_of(g, b["c2"])? == vec![(Key::Int(1), b["o"])])
                        })
                },
            )
            .step(
                "clear_customer",
                |g, b| g.set(b["o"], "customer", Value::Null),
                |a| {
                    a.check("c2 is empty", |g, b| Ok(orders_of(g, b["c2"])?.is_empty()))
                        .check("o has no customer", |g, b| {
                            Ok(g.get_ref(b["o"], "customer")?.is_none())
                        })
                },
            )
    }

    #[test]
    fn test_reference_moves_between_collections() {
        scenario().run().unwrap();
    }
}

mod rejected_targets {
    use super::*;

    pub fn scenario() -> Scenario {
        Scenario::new("rejected_targets")
            .registry(fixtures::commerce)
            .step(
                "spawn",
                |g, b| {
                    b.bind("c", g.create("Customer", attrs! { "id" => 1 })?);
                    b.bind("o", g.create("Order", attrs! { "id" => 1 })?);
                    b.bind("p", g.create("Product", attrs! { "sku" => "X-1" })?);
                    Ok(())
                },
                |a| a.entities(3),
            )
            .step(
                "point_customer_at_product",
                |g, b| g.set(b["o"], "customer", b["p"]),
                |a| {
                    a.error("Invalid reference class")
                        .error_pattern(r"Order\.customer expects Customer, got Product")
                        .check("o unchanged", |g, b| Ok(g.get_ref(b["o"], "customer")?.is_none()))
                },
            )
            .step(
                "point_customer_at_string",
                |g, b| g.set(b["o"], "customer", "Customer1"),
                |a| a.error("got String"),
            )
            .step(
                "point_customer_at_missing_entity",
                |g, b| g.set(b["o"], "customer", EntityId::new(999)),
                |a| a.error("Entity not found"),
            )
    }

    #[test]
    fn test_wrong_targets_are_rejected() {
        scenario().run().unwrap();
    }
}

#[test]
fn test_subtype_is_accepted_as_target() {
    // GIVEN a customer and an Order2
    let registry = fixtures::commerce().unwrap();
    let mut graph = Graph::new(&registry);
    let c = graph.create("Customer", attrs! { "id" => 1, "name" => "Customer1" }).unwrap();
    let o1 = graph
        .create("Order", attrs! { "id" => 1, "amount" => 10, "customer" => c })
        .unwrap();
    let o2 = graph
        .create("Order2", attrs! { "id" => 2, "amount" => 20, "company" => "Company1" })
        .unwrap();

    // WHEN adding the Order2 to the customer's orders
    graph.collection_mut(c, "orders").unwrap().add(o2).unwrap();

    // THEN both orders are held, keyed by id
    assert_eq!(
        orders_of(&graph, c).unwrap(),
        vec![(Key::Int(1), o1), (Key::Int(2), o2)]
    );
    assert_eq!(graph.get_ref(o2, "customer").unwrap(), Some(c));

    // WHEN removing the first order
    assert!(graph.collection_mut(c, "orders").unwrap().remove(o1).unwrap());

    // THEN only the Order2 is left and o1 has no customer
    assert_eq!(orders_of(&graph, c).unwrap(), vec![(Key::Int(2), o2)]);
    assert_eq!(graph.get_ref(o1, "customer").unwrap(), None);
}

#[test]
fn test_one_to_one_pairs_steal_partners() {
    // GIVEN a married to b
    let registry = fixtures::people().unwrap();
    let mut graph = Graph::new(&registry);
    let a = graph.create("Person", attrs! { "name" => "a" }).unwrap();
    let b = graph.create("Person", attrs! { "name" => "b", "spouse" => a }).unwrap();
    let x = graph.create("Person", attrs! { "name" => "x" }).unwrap();
    assert_eq!(graph.get_ref(a, "spouse").unwrap(), Some(b));

    // WHEN x marries a
    graph.set(x, "spouse", a).unwrap();

    // THEN a and x point at each other and b is single
    assert_eq!(graph.get_ref(a, "spouse").unwrap(), Some(x));
    assert_eq!(graph.get_ref(x, "spouse").unwrap(), Some(a));
    assert_eq!(graph.get_ref(b, "spouse").unwrap(), None);
}

#[test]
fn test_one_to_one_across_types() {
    // GIVEN a passport held by p1
    let registry = fixtures::people().unwrap();
    let mut graph = Graph::new(&registry);
    let p1 = graph.create("Person", attrs! { "name" => "p1" }).unwrap();
    let p2 = graph.create("Person", attrs! { "name" => "p2" }).unwrap();
    let passport = graph
        .create("Passport", attrs! { "number" => "N1", "holder" => p1 })
        .unwrap();
    assert_eq!(graph.get_ref(p1, "passport").unwrap(), Some(passport));

    // WHEN p2 takes the passport from its side
    graph.set(p2, "passport", passport).unwrap();

    // THEN the holder follows and p1 loses it
    assert_eq!(graph.get_ref(passport, "holder").unwrap(), Some(p2));
    assert_eq!(graph.get_ref(p1, "passport").unwrap(), None);

    // WHEN a person is handed a spouse where a passport belongs
    let err = graph.set(p1, "passport", p2).unwrap_err();

    // THEN the type is checked
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
}

#[test]
fn test_one_way_reference_leaves_target_alone() {
    // GIVEN a car owned by p
    let registry = fixtures::people().unwrap();
    let mut graph = Graph::new(&registry);
    let p = graph.create("Person", attrs! { "name" => "p" }).unwrap();
    let car = graph
        .create("Car", attrs! { "plate" => "AB-12", "owner" => p })
        .unwrap();

    // THEN the owner is set and nothing on p changed
    assert_eq!(graph.get_ref(car, "owner").unwrap(), Some(p));
    assert_eq!(graph.get_ref(p, "spouse").unwrap(), None);

    // WHEN p is removed, the one-way reference is left dangling
    graph.remove(p).unwrap();
    assert_eq!(graph.get_ref(car, "owner").unwrap(), Some(p));
    assert!(!graph.contains(p));

    // AND clearing it afterwards still works
    graph.set(car, "owner", Value::Null).unwrap();
    assert_eq!(graph.get_ref(car, "owner").unwrap(), None);
}
