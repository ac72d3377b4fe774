//! Cascading line → course selection.

use crate::location::PersistedFilter;
use crate::models::VehicleQuery;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPhase {
    NoLineSelected,
    LineSelectedNoCourse,
    LineAndCourseSelected,
}

/// The selected line and course. A course is never held without a line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilterState {
    line: Option<String>,
    course: Option<String>,
}

impl FilterState {
    pub fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }

    pub fn course(&self) -> Option<&str> {
        self.course.as_deref()
    }

    pub fn phase(&self) -> FilterPhase {
        match (&self.line, &self.course) {
            (None, _) => FilterPhase::NoLineSelected,
            (Some(_), None) => FilterPhase::LineSelectedNoCourse,
            (Some(_), Some(_)) => FilterPhase::LineAndCourseSelected,
        }
    }

    pub fn vehicle_query(&self) -> VehicleQuery {
        VehicleQuery {
            line: self.line.clone(),
            course: self.course.clone(),
        }
    }

    pub fn persisted(&self) -> PersistedFilter {
        PersistedFilter {
            line: self.line.clone(),
            course: self.course.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CourseSelector {
    Hidden,
    Loading { line: String },
    Ready { line: String, courses: Vec<String> },
}

impl CourseSelector {
    pub fn is_visible(&self) -> bool {
        matches!(self, CourseSelector::Ready { .. })
    }
}

/// Side effects a caller must carry out after a filter mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterChange {
    pub fetch_courses_for: Option<String>,
}

#[derive(Debug)]
pub struct FilterController {
    state: FilterState,
    selector: CourseSelector,
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl FilterController {
    /// Seeds the selection from the page address. Nothing is written back.
    pub fn init_from_url(persisted: &PersistedFilter) -> (Self, FilterChange) {
        let line = persisted.line.as_deref().and_then(normalize);
        let course = match line {
            Some(_) => persisted.course.as_deref().and_then(normalize),
            None => None,
        };

        let selector = match &line {
            Some(line) => CourseSelector::Loading { line: line.clone() },
            None => CourseSelector::Hidden,
        };

        let change = FilterChange {
            fetch_courses_for: line.clone(),
        };

        (
            Self {
                state: FilterState { line, course },
                selector,
            },
            change,
        )
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn selector(&self) -> &CourseSelector {
        &self.selector
    }

    pub fn set_line(&mut self, line: &str) -> FilterChange {
        let line = normalize(line);

        self.state.course = None;
        self.state.line = line.clone();
        self.selector = match &line {
            Some(line) => CourseSelector::Loading { line: line.clone() },
            None => CourseSelector::Hidden,
        };

        tracing::info!(line = ?self.state.line, "line selected");

        FilterChange {
            fetch_courses_for: line,
        }
    }

    /// Returns `None` when no line is selected; the course is left untouched then.
    pub fn set_course(&mut self, course: &str) -> Option<FilterChange> {
        if self.state.line.is_none() {
            tracing::debug!(course, "ignoring course selection without a line");
            return None;
        }

        self.state.course = normalize(course);

        tracing::info!(line = ?self.state.line, course = ?self.state.course, "course selected");

        Some(FilterChange {
            fetch_courses_for: None,
        })
    }

    /// Applies a course enumeration. Returns false if it was for another line.
    pub fn courses_loaded(&mut self, line: &str, courses: Vec<String>) -> bool {
        let is_current = match &self.selector {
            CourseSelector::Loading { line: pending }
            | CourseSelector::Ready { line: pending, .. } => pending == line,
            CourseSelector::Hidden => false,
        };

        if !is_current {
            return false;
        }

        self.selector = CourseSelector::Ready {
            line: line.to_string(),
            courses,
        };
        true
    }
}
