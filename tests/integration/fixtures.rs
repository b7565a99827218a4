//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A library schema with tasks, mutations and join tables
//! - A tracker wired to an in-memory engine
//! - Building argument maps and result rows

use std::sync::Arc;

use serde_json::Value;

use sqlgate::compiler::{Args, CompiledSchema};
use sqlgate::config::{Config, TaskConfig};
use sqlgate::{ArgValue, MemoryEngine, Record, Task, TaskTracker};

pub const LIBRARY_SCHEMA: &str = r#"
    type Book {
        id: ID!
        title: String
        author: String
        genres: [String] @sql(query: "SELECT g.name FROM genre g JOIN $join_table(book_genres) bg ON bg.genre_id = g.id WHERE bg.book_id = $source.id")
    }

    type Report @task_response {
        total: Int
        genre: String
    }

    type Query {
        books(author: String, minYear: Int): [Book] @sql(query: "SELECT * FROM book WHERE author = '$args.author' AND year >= $args.minYear")
        search(q: String!): [Book] @sql(query: "SELECT * FROM book WHERE title LIKE '%$args.q%'")
        genreReport(genre: String): [Report] @task @sql(query: "SELECT count(*) AS total, g.name AS genre FROM book b JOIN $join_table(book_genres) bg ON bg.book_id = b.id JOIN genre g ON g.id = bg.genre_id WHERE g.name = $args.genre GROUP BY g.name")
    }

    type Mutation {
        addBook(title: String!, author: String): Book @returns(shape: ROW) @sql(query: "INSERT INTO book (title, author) VALUES ($args.title, $args.author)")
        retitle(id: ID!, title: String!): Boolean @sql(query: "UPDATE book SET title = $args.title WHERE id = $args.id")
        removeBook(id: ID!): Boolean @sql(query: "DELETE FROM book WHERE id = $args.id")
        tagBook(bookId: ID!, genreId: ID!): Boolean @sql(query: "INSERT INTO $join_table(book_genres) (book_id, genre_id) VALUES ($args.bookId, $args.genreId)")
    }
"#;

pub fn config() -> Config {
    let mut config = Config::default();
    config.join_tables.prefix = "lnk_".to_string();
    config
}

pub fn schema() -> CompiledSchema {
    CompiledSchema::from_sdl(LIBRARY_SCHEMA, &config()).expect("library schema compiles")
}

/// A tracker over the library schema plus a handle on its engine.
pub struct TestTracker {
    pub schema: CompiledSchema,
    pub engine: Arc<MemoryEngine>,
    pub tracker: Arc<TaskTracker>,
}

impl TestTracker {
    pub fn new() -> Self {
        Self::with_config(TaskConfig::default())
    }

    pub fn with_config(config: TaskConfig) -> Self {
        let schema = schema();
        let engine = Arc::new(MemoryEngine::new());
        let tracker = Arc::new(TaskTracker::new(engine.clone(), config).with_schema(&schema));
        Self {
            schema,
            engine,
            tracker,
        }
    }

    /// Trigger a root-query field.
    pub async fn trigger(&self, field: &str, args: Args) -> Task {
        let op = self
            .schema
            .operations
            .query(field)
            .expect("query field exists");
        self.tracker
            .trigger(op, args, None)
            .await
            .expect("trigger succeeds")
    }

    pub async fn trigger_books(&self) -> Task {
        self.trigger(
            "books",
            args(&[("author", "Ursula K. Le Guin".into()), ("minYear", ArgValue::Int(1970))]),
        )
        .await
    }
}

pub fn args(pairs: &[(&str, ArgValue)]) -> Args {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn row(value: Value) -> Record {
    value.as_object().cloned().expect("row is a JSON object")
}

pub fn book_rows() -> Vec<Record> {
    vec![
        row(serde_json::json!({"id": "1", "title": "The Dispossessed", "author": "Ursula K. Le Guin", "year": 1974})),
        row(serde_json::json!({"id": "2", "title": "The Lathe of Heaven", "author": "Ursula K. Le Guin", "year": 1971})),
    ]
}
