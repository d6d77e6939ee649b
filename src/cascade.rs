//! Person → date selection cascade.
//!
//! Choosing a person invalidates the date list; the list is then replaced
//! wholesale by the dates fetched for that person, and the first date is
//! selected.

use log::{debug, warn};

/// State of the two cascading selectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionCascade {
    persons: Vec<String>,
    person: Option<String>,
    dates: Vec<String>,
    date: Option<String>,
}

impl SelectionCascade {
    pub fn new(persons: Vec<String>) -> Self {
        Self {
            persons,
            ..Self::default()
        }
    }

    pub fn persons(&self) -> &[String] {
        &self.persons
    }

    pub fn person(&self) -> Option<&str> {
        self.person.as_deref()
    }

    /// Date options for the selected person, in the order received.
    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    /// Select a person. Clears the dependent date list until it is refilled.
    pub fn select_person(&mut self, person: &str) {
        if !self.persons.is_empty() && !self.persons.iter().any(|p| p == person) {
            warn!("[SelectionCascade] Person {} is not in the person list", person);
        }
        self.person = Some(person.to_string());
        self.dates.clear();
        self.date = None;
    }

    /// Replace the date options with the list fetched for `person`.
    ///
    /// Ignored (returns `false`) if `person` is no longer selected.
    pub fn replace_dates(&mut self, person: &str, dates: Vec<String>) -> bool {
        if self.person.as_deref() != Some(person) {
            debug!(
                "[SelectionCascade] Ignoring dates for {}, current person is {:?}",
                person, self.person
            );
            return false;
        }
        self.date = dates.first().cloned();
        self.dates = dates;
        true
    }

    /// Select one of the current date options.
    pub fn select_date(&mut self, date: &str) -> bool {
        if !self.dates.iter().any(|d| d == date) {
            warn!("[SelectionCascade] Date {} is not an option for {:?}", date, self.person);
            return false;
        }
        self.date = Some(date.to_string());
        true
    }

    /// The (person, date) pair ready to request, if both are selected.
    pub fn selection(&self) -> Option<(String, String)> {
        Some((self.person.clone()?, self.date.clone()?))
    }

    /// Page heading for the current selection.
    pub fn heading(&self) -> Option<String> {
        let (person, date) = self.selection()?;
        Some(format!("Person {} on {}", person, date))
    }
}
