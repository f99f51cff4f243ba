//! Response-shape normalization.
//!
//! The backend is inconsistent about list and create responses: some list
//! routes return a bare JSON array, others wrap it in an object under a
//! resource-specific field (`posts`, `usuarios`, `comentarios`, ...), with or
//! without pagination metadata. Create routes sometimes return the record and
//! sometimes `{ "post": record, "mensagem": ... }`.
//!
//! Everything is decoded here, once, into [`Page`] and [`Created`] so nothing
//! above the client has to guess the shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// A page of results in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of matching items, or the page length when unknown.
    pub total: u64,
    /// 1-based page number, when the backend reports it.
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub total_pages: Option<u64>,
}

impl<T> Page<T> {
    /// A page with no pagination metadata.
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            total: items.len() as u64,
            items,
            page: None,
            per_page: None,
            total_pages: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply `f` to every item, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::from_items(Vec::new())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListShape<T> {
    Bare(Vec<T>),
    Wrapped(ListEnvelope<T>),
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    #[serde(
        alias = "posts",
        alias = "usuarios",
        alias = "cursos",
        alias = "comentarios",
        alias = "mensagens",
        alias = "vagas",
        alias = "areas",
        alias = "conversas"
    )]
    items: Vec<T>,
    #[serde(default, alias = "total_vagas", alias = "total_areas")]
    total: Option<u64>,
    #[serde(default, alias = "pagina")]
    page: Option<u64>,
    #[serde(default, alias = "por_pagina")]
    per_page: Option<u64>,
    #[serde(default, alias = "total_paginas")]
    total_pages: Option<u64>,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Page<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ListShape::<T>::deserialize(deserializer)? {
            ListShape::Bare(items) => Page::from_items(items),
            ListShape::Wrapped(envelope) => Page {
                total: envelope.total.unwrap_or(envelope.items.len() as u64),
                items: envelope.items,
                page: envelope.page,
                per_page: envelope.per_page,
                total_pages: envelope.total_pages,
            },
        })
    }
}

/// Result of a create-style request.
#[derive(Debug, Clone, PartialEq)]
pub enum Created<T> {
    /// The backend returned the created record.
    Record(T),
    /// The backend only acknowledged the request.
    Ack { message: String },
}

impl<T> Created<T> {
    /// The created record, when the backend returned one.
    pub fn into_record(self) -> Option<T> {
        match self {
            Self::Record(record) => Some(record),
            Self::Ack { .. } => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedShape<T> {
    Wrapped(CreatedEnvelope<T>),
    Bare(T),
    Ack(AckBody),
}

#[derive(Deserialize)]
struct CreatedEnvelope<T> {
    #[serde(
        alias = "post",
        alias = "comentario",
        alias = "curso",
        alias = "conversa",
        alias = "usuario"
    )]
    record: T,
}

#[derive(Deserialize)]
struct AckBody {
    #[serde(alias = "mensagem")]
    message: String,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Created<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match CreatedShape::<T>::deserialize(deserializer)? {
            CreatedShape::Wrapped(envelope) => Created::Record(envelope.record),
            CreatedShape::Bare(record) => Created::Record(record),
            CreatedShape::Ack(ack) => Created::Ack {
                message: ack.message,
            },
        })
    }
}
