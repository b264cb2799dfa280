use crate::model::*;

/// Free half-open windows in `query` not covered by any live booking of the
/// vehicle, keeping only windows at least `min_duration` long.
///
/// Walks the bookings in start order with a cursor; each live booking closes
/// the gap before it and pushes the cursor to its end.
pub fn free_windows(vs: &VehicleState, query: &Span, min_duration: Option<Ms>) -> Vec<Span> {
    let min = min_duration.unwrap_or(1);
    let mut free = Vec::new();
    let mut cursor = query.start;
    for booking in vs.overlapping(query).filter(|b| b.is_live()) {
        let span = booking.span();
        // `overlapping` only yields bookings starting before `query.end`.
        if span.start - cursor >= min {
            free.push(Span::new(cursor, span.start));
        }
        cursor = cursor.max(span.end);
        if cursor >= query.end {
            return free;
        }
    }
    if query.end - cursor >= min {
        free.push(Span::new(cursor, query.end));
    }
    free
}
