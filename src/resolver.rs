//! Picking the options that apply to one placeholder.

use std::collections::HashSet;

use kstring::KString;

use crate::error::{TemplateError, TemplateErrorKind};
use crate::options::{IdentifiedOptions, OptionsInput, RequestOptions};
use crate::placeholder::Placeholder;

/// Checks on the whole input, before any placeholder is looked at.
/// `single_request`: the template root is the placeholder, so there
/// are no refs to select by.
pub fn check_input(input: &OptionsInput, single_request: bool) -> Result<(), TemplateError> {
    match input {
        OptionsInput::Single(_) => Ok(()),
        OptionsInput::ById(entries) => {
            if single_request {
                Err(TemplateErrorKind::IdNotApplicable(
                    "a single request template takes one options record"))?
            }
            check_unique_ids(entries)
        }
    }
}

/// Fails on the earliest duplicate.
pub fn check_unique_ids(entries: &[IdentifiedOptions]) -> Result<(), TemplateError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for e in entries {
        if ! seen.insert(e.id.as_str()) {
            Err(TemplateErrorKind::DuplicateOptionsId { id: e.id.clone() })?
        }
    }
    Ok(())
}

/// Header names must be HTTP tokens, values must not contain line
/// breaks or NUL.
pub fn check_headers(options: &RequestOptions) -> Result<(), TemplateError> {
    fn is_tchar(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
    }
    for (name, value) in &options.headers {
        if name.is_empty() || ! name.bytes().all(is_tchar) {
            Err(TemplateErrorKind::InvalidHeaderName { name: name.clone() })?
        }
        if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
            Err(TemplateErrorKind::InvalidHeaderValue { name: name.clone() })?
        }
    }
    Ok(())
}

/// The options for `placeholder`. A plain record applies to every
/// placeholder, but then no placeholder may carry a `ref`. With the
/// list form, a placeholder without `ref` gets default options.
pub fn resolve(
    input: &OptionsInput,
    placeholder: &Placeholder
) -> Result<RequestOptions, TemplateError> {
    let options = match (input, &placeholder.ref_id) {
        (OptionsInput::Single(o), None) => o.clone(),
        (OptionsInput::Single(_), Some(_)) =>
            Err(TemplateErrorKind::IdNotApplicable(
                "placeholder has a ref, but options were not given as a list"))?,
        (OptionsInput::ById(_), None) => RequestOptions::default(),
        (OptionsInput::ById(entries), Some(id)) => find(entries, id)
            .ok_or_else(|| TemplateErrorKind::OptionsIdNotFound {
                position: placeholder.position,
                id: id.clone()
            })?
            .clone(),
    };
    check_headers(&options)?;
    Ok(options)
}

fn find<'e>(entries: &'e [IdentifiedOptions], id: &KString) -> Option<&'e RequestOptions> {
    entries.iter().find(|e| e.id == *id).map(|e| &e.options)
}
