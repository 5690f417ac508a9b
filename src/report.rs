//! Human-readable case summary, as shared from the detail screen.

use crate::local_db_model::Crime;

const DATE_FORMAT: &str = "%a,%b,%d";

pub fn crime_report(crime: &Crime) -> String {
    let solved = if crime.is_solved {
        "The case is solved"
    } else {
        "The case is not solved"
    };

    let suspect = if crime.suspect.trim().is_empty() {
        "there is no suspect.".to_string()
    } else {
        format!("the suspect is {}.", crime.suspect)
    };

    format!(
        "{}! The crime was discovered on {}. {}, and {}",
        crime.title,
        crime.date.format(DATE_FORMAT),
        solved,
        suspect
    )
}
