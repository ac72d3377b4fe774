//! Filter selection persisted in the page address.
//!
//! The address is read once when the session starts. After that the filter
//! state is authoritative and every change is pushed to the address as a new
//! history entry, never as a navigation.

use crate::errors::ConfigError;
use url::Url;

pub const LINE_PARAM: &str = "line";
pub const COURSE_PARAM: &str = "course";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedFilter {
    pub line: Option<String>,
    pub course: Option<String>,
}

pub trait QueryStore {
    fn read(&self) -> PersistedFilter;

    fn push(&mut self, filter: &PersistedFilter);
}

/// In-process stand-in for the browser address bar and its history stack.
#[derive(Clone, Debug)]
pub struct PageLocation {
    history: Vec<Url>,
}

impl PageLocation {
    pub fn new(url: Url) -> Self {
        Self { history: vec![url] }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|source| ConfigError::PageUrl {
            url: raw.to_string(),
            source,
        })?;
        Ok(Self::new(url))
    }

    pub fn current(&self) -> &Url {
        // history is never empty, it starts with the loaded address
        &self.history[self.history.len() - 1]
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl QueryStore for PageLocation {
    fn read(&self) -> PersistedFilter {
        let mut filter = PersistedFilter::default();

        for (name, value) in self.current().query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                LINE_PARAM => filter.line = Some(value.to_string()),
                COURSE_PARAM => filter.course = Some(value.to_string()),
                _ => {}
            }
        }

        filter
    }

    fn push(&mut self, filter: &PersistedFilter) {
        let next = with_filter(self.current(), filter);

        if &next == self.current() {
            return;
        }

        tracing::debug!(url = %next, "address updated");
        self.history.push(next);
    }
}

/// Rewrites `line`/`course` in `url`, keeping every other parameter in place.
pub fn with_filter(url: &Url, filter: &PersistedFilter) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != LINE_PARAM && name != COURSE_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    let mut next = url.clone();
    next.set_query(None);

    let line = filter.line.as_deref().filter(|l| !l.is_empty());
    let course = line.and(filter.course.as_deref().filter(|c| !c.is_empty()));

    if kept.is_empty() && line.is_none() {
        return next;
    }

    {
        let mut pairs = next.query_pairs_mut();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
        if let Some(line) = line {
            pairs.append_pair(LINE_PARAM, line);
        }
        if let Some(course) = course {
            pairs.append_pair(COURSE_PARAM, course);
        }
    }

    next
}
