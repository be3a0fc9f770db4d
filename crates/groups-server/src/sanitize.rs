//! Client payload sanitizing.
//!
//! Each resource declares the fields a client may write. Anything else in the
//! body (ids, timestamps, derived fields) is dropped before the payload is
//! read, and each remaining field is checked for its JSON type.

use groups_shared::api::{
    CreateArticleRequest, CreateGroupRequest, FieldError, UpdateArticleRequest,
    UpdateGroupRequest,
};
use groups_shared::{Article, Group};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::validation::{required, ValidationErrors};

pub struct Payload {
    fields: Map<String, Value>,
    errors: ValidationErrors,
}

impl Payload {
    /// Keeps only the `allowed` keys of a JSON object body.
    pub fn sanitize(model: &'static str, allowed: &[&str], body: Value) -> Result<Self, AppError> {
        let Value::Object(object) = body else {
            return Err(AppError::BadRequest(
                "Request body must be a JSON object.".to_string(),
            ));
        };

        let (fields, dropped): (Map<String, Value>, Map<String, Value>) = object
            .into_iter()
            .partition(|(key, _)| allowed.contains(&key.as_str()));
        if !dropped.is_empty() {
            tracing::debug!(
                model,
                dropped = ?dropped.keys().collect::<Vec<_>>(),
                "Dropped fields not writable by clients"
            );
        }

        Ok(Self {
            fields,
            errors: ValidationErrors::new(model),
        })
    }

    /// A trimmed string. Missing and `null` both read as `None`.
    pub fn string(&mut self, field: &str) -> Option<String> {
        match self.fields.remove(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(other) => {
                self.errors.push(cast_error(field, "String", other));
                None
            }
        }
    }

    /// Like [`Payload::string`], recording a `required` failure when the
    /// value is missing or blank.
    pub fn required_string(&mut self, field: &str) -> Option<String> {
        let present = self.fields.get(field).map_or(false, |v| !v.is_null());
        match self.string(field) {
            Some(s) if !s.is_empty() => Some(s),
            Some(_) => {
                self.errors.push(required(field));
                None
            }
            None if !present => {
                self.errors.push(required(field));
                None
            }
            None => None,
        }
    }

    /// A group reference. Missing reads as `None`, `null` as `Some(None)`.
    pub fn reference(&mut self, field: &str) -> Option<Option<Uuid>> {
        match self.fields.remove(field) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(s)) => match Uuid::parse_str(&s) {
                Ok(id) => Some(Some(id)),
                Err(e) => {
                    self.errors.push(
                        cast_error(field, "ObjectId", Value::String(s)).with_reason(e.to_string()),
                    );
                    None
                }
            },
            Some(other) => {
                self.errors.push(cast_error(field, "ObjectId", other));
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        self.errors.into_result()
    }
}

fn cast_error(field: &str, kind: &str, value: Value) -> FieldError {
    let message = format!(
        "Cast to {} failed for value \"{}\" at path \"{}\"",
        kind,
        value_text(&value),
        field
    );
    FieldError::new(field, kind, message).with_value(value)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn create_group(body: Value) -> Result<CreateGroupRequest, AppError> {
    let mut payload = Payload::sanitize(Group::MODEL_NAME, Group::WRITABLE_FIELDS, body)?;
    let name = payload.required_string("name");
    let parent = payload.reference("parent").flatten();
    payload.finish()?;

    Ok(CreateGroupRequest {
        name: name.unwrap_or_default(),
        parent,
    })
}

pub fn update_group(body: Value) -> Result<UpdateGroupRequest, AppError> {
    let mut payload = Payload::sanitize(Group::MODEL_NAME, Group::WRITABLE_FIELDS, body)?;
    let name = payload.string("name");
    let parent = payload.reference("parent");
    payload.finish()?;

    Ok(UpdateGroupRequest { name, parent })
}

pub fn create_article(body: Value) -> Result<CreateArticleRequest, AppError> {
    let mut payload = Payload::sanitize(Article::MODEL_NAME, Article::WRITABLE_FIELDS, body)?;
    let slug = payload.required_string("slug");
    let title = payload.required_string("title");
    let body = payload.string("body");
    payload.finish()?;

    Ok(CreateArticleRequest {
        slug: slug.unwrap_or_default().to_lowercase(),
        title: title.unwrap_or_default(),
        body,
    })
}

pub fn update_article(body: Value) -> Result<UpdateArticleRequest, AppError> {
    let mut payload = Payload::sanitize(Article::MODEL_NAME, Article::WRITABLE_FIELDS, body)?;
    let slug = payload.string("slug").map(|slug| slug.to_lowercase());
    let title = payload.string("title");
    let body = payload.string("body");
    payload.finish()?;

    Ok(UpdateArticleRequest { slug, title, body })
}
