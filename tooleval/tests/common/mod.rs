//! Shared tool catalog for integration tests

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tooleval::{EvalConfig, Field, RetryPolicy, ShapeDescriptor, ToolRegistry, ToolSchema, Variant};

pub fn get_weather() -> ToolSchema {
    ToolSchema::new("get_weather")
        .with_tier(1)
        .with_tags(&["primitive", "extraction"])
        .with_description("Get the current weather for a city")
        .with_param(Field::new("city", ShapeDescriptor::string()))
}

pub fn add_numbers() -> ToolSchema {
    ToolSchema::new("add_numbers")
        .with_tier(1)
        .with_tags(&["primitive", "math"])
        .with_param(Field::new("a", ShapeDescriptor::integer()))
        .with_param(Field::new("b", ShapeDescriptor::integer()))
}

pub fn search_products() -> ToolSchema {
    ToolSchema::new("search_products")
        .with_tier(2)
        .with_param(Field::new("query", ShapeDescriptor::string()))
        .with_param(Field::new("max_price", ShapeDescriptor::optional(ShapeDescriptor::number())))
        .with_param(Field::new("category", ShapeDescriptor::optional(ShapeDescriptor::string())))
}

pub fn create_event() -> ToolSchema {
    ToolSchema::new("create_event")
        .with_tier(2)
        .with_param(Field::new("title", ShapeDescriptor::string()))
        .with_param(Field::new("date", ShapeDescriptor::date()))
        .with_param(Field::new("attendees", ShapeDescriptor::list(ShapeDescriptor::string())))
}

pub fn send_message() -> ToolSchema {
    ToolSchema::new("send_message")
        .with_tier(2)
        .with_param(Field::new("to", ShapeDescriptor::string()))
        .with_param(Field::new("subject", ShapeDescriptor::string()))
        .with_param(Field::new("body", ShapeDescriptor::string()))
        .with_param(Field::new("priority", ShapeDescriptor::string()).with_default(json!("normal")))
}

fn address() -> ShapeDescriptor {
    ShapeDescriptor::object(vec![
        Field::new("street", ShapeDescriptor::string()),
        Field::new("city", ShapeDescriptor::string()),
        Field::new("state", ShapeDescriptor::string()),
        Field::new("zip_code", ShapeDescriptor::string()),
        Field::new("country", ShapeDescriptor::string()).with_default(json!("USA")),
    ])
}

pub fn create_order() -> ToolSchema {
    ToolSchema::new("create_order")
        .with_tier(3)
        .with_param(Field::new(
            "customer",
            ShapeDescriptor::object(vec![
                Field::new("name", ShapeDescriptor::string()),
                Field::new("email", ShapeDescriptor::string()),
                Field::new("phone", ShapeDescriptor::optional(ShapeDescriptor::string())),
            ]),
        ))
        .with_param(Field::new(
            "items",
            ShapeDescriptor::list(ShapeDescriptor::object(vec![
                Field::new("product_id", ShapeDescriptor::string()),
                Field::new("quantity", ShapeDescriptor::integer()),
                Field::new("unit_price", ShapeDescriptor::number()),
            ])),
        ))
        .with_param(Field::new("shipping", address()))
}

pub fn execute_action() -> ToolSchema {
    ToolSchema::new("execute_action").with_tier(4).with_param(Field::new(
        "action",
        ShapeDescriptor::union(
            "action_type",
            vec![
                Variant::new(
                    "create",
                    vec![
                        Field::new("resource_type", ShapeDescriptor::string()),
                        Field::new("name", ShapeDescriptor::string()),
                        Field::new("metadata", ShapeDescriptor::optional(ShapeDescriptor::any())),
                    ],
                ),
                Variant::new(
                    "update",
                    vec![
                        Field::new("resource_id", ShapeDescriptor::string()),
                        Field::new("updates", ShapeDescriptor::any()),
                    ],
                ),
                Variant::new(
                    "delete",
                    vec![
                        Field::new("resource_id", ShapeDescriptor::string()),
                        Field::new("soft_delete", ShapeDescriptor::boolean())
                            .with_default(json!(false)),
                    ],
                ),
            ],
        ),
    ))
}

pub fn catalog() -> Vec<ToolSchema> {
    vec![
        get_weather(),
        add_numbers(),
        search_products(),
        create_event(),
        send_message(),
        create_order(),
        execute_action(),
    ]
}

pub fn registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new(catalog()).expect("catalog is valid"))
}

/// Retries without waiting, so tests stay fast
pub fn quick_config() -> EvalConfig {
    EvalConfig::default().with_retry(
        RetryPolicy::default()
            .with_initial_backoff(Duration::ZERO)
            .with_max_backoff(Duration::ZERO),
    )
}

pub fn two_item_order() -> serde_json::Value {
    json!({
        "customer": {"name": "Ada Lovelace", "email": "ada@example.com"},
        "items": [
            {"product_id": "SKU-1", "quantity": 2, "unit_price": 9.99},
            {"product_id": "SKU-2", "quantity": 1, "unit_price": 24.5}
        ],
        "shipping": {
            "street": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "zip_code": "62701"
        }
    })
}
