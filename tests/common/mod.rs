#![allow(dead_code)]

use chrono::{DateTime, Utc};
use hydrate::{Entity, EntityDescriptor, SqliteExecutor};
use serde::Serialize;
use std::sync::Arc;

pub const SCHEMA: &str = "
    CREATE TABLE schools (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE textbooks (
        id INTEGER PRIMARY KEY,
        school_id INTEGER REFERENCES schools(id),
        title TEXT NOT NULL,
        published_at TEXT
    );
    CREATE TABLE chapters (
        id INTEGER PRIMARY KEY,
        textbook_id INTEGER NOT NULL REFERENCES textbooks(id),
        title TEXT NOT NULL,
        position INTEGER NOT NULL
    );
    CREATE TABLE reviews (
        id INTEGER PRIMARY KEY,
        textbook_id INTEGER NOT NULL REFERENCES textbooks(id),
        rating INTEGER NOT NULL,
        verified INTEGER NOT NULL
    );
";

pub const SEED: &str = "
    INSERT INTO schools VALUES (1, 'Northside'), (2, 'Riverside'), (3, 'Empty Hill');
    INSERT INTO textbooks VALUES
        (10, 1, 'Algebra', '2021-09-01 00:00:00'),
        (11, 1, 'Biology', NULL),
        (12, 2, 'Chemistry', '2022-01-15T08:30:00Z'),
        (13, NULL, 'Orphan Notes', NULL);
    INSERT INTO chapters VALUES
        (100, 10, 'Equations', 1),
        (101, 10, 'Inequalities', 2),
        (102, 12, 'Atoms', 1);
    INSERT INTO reviews VALUES
        (200, 10, 5, 1),
        (201, 11, 3, 0),
        (202, 10, 4, 1);
";

#[derive(Debug, Clone, Default, Serialize)]
pub struct School {
    pub id: i64,
    pub name: String,
    pub textbooks: Vec<Arc<Textbook>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Textbook {
    pub id: i64,
    pub school_id: Option<i64>,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub chapters: Vec<Chapter>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Chapter {
    pub id: i64,
    pub textbook_id: i64,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub textbook_id: i64,
    pub rating: u8,
    pub verified: bool,
}

/// Reads `textbooks.title` into an integer, which no row can satisfy
#[derive(Debug, Clone, Default)]
pub struct BadTextbook {
    pub id: i64,
    pub title: i64,
}

impl Entity for School {
    fn describe() -> EntityDescriptor<Self> {
        Self::descriptor("schools")
            .key("id", |s| &s.id, |s| &mut s.id)
            .field("name", |s| &s.name, |s| &mut s.name)
            .relation("textbooks", &["id"], &["school_id"], |s| &mut s.textbooks)
    }
}

impl Entity for Textbook {
    fn describe() -> EntityDescriptor<Self> {
        Self::descriptor("textbooks")
            .key("id", |t| &t.id, |t| &mut t.id)
            .field("school_id", |t| &t.school_id, |t| &mut t.school_id)
            .field("title", |t| &t.title, |t| &mut t.title)
            .field("published_at", |t| &t.published_at, |t| &mut t.published_at)
            .relation("chapters", &["id"], &["textbook_id"], |t| &mut t.chapters)
            .relation("reviews", &["id"], &["textbook_id"], |t| &mut t.reviews)
    }
}

impl Entity for Chapter {
    fn describe() -> EntityDescriptor<Self> {
        Self::descriptor("chapters")
            .key("id", |c| &c.id, |c| &mut c.id)
            .field("textbook_id", |c| &c.textbook_id, |c| &mut c.textbook_id)
            .field("title", |c| &c.title, |c| &mut c.title)
            .field("position", |c| &c.position, |c| &mut c.position)
    }
}

impl Entity for Review {
    fn describe() -> EntityDescriptor<Self> {
        Self::descriptor("reviews")
            .key("id", |r| &r.id, |r| &mut r.id)
            .field("textbook_id", |r| &r.textbook_id, |r| &mut r.textbook_id)
            .field("rating", |r| &r.rating, |r| &mut r.rating)
            .field("verified", |r| &r.verified, |r| &mut r.verified)
    }
}

impl Entity for BadTextbook {
    fn describe() -> EntityDescriptor<Self> {
        Self::descriptor("textbooks")
            .key("id", |t| &t.id, |t| &mut t.id)
            .field("title", |t| &t.title, |t| &mut t.title)
    }
}

pub fn seed(executor: &SqliteExecutor) {
    executor.execute_batch(SCHEMA).unwrap();
    executor.execute_batch(SEED).unwrap();
}

/// In-memory database with the textbook schema loaded
pub fn seeded() -> SqliteExecutor {
    let executor = SqliteExecutor::in_memory().unwrap();
    seed(&executor);
    executor
}
