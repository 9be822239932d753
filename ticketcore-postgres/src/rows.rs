//! Column decoding for rows read back from the ticket schema.

use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use ticketcore_types::{
    Fare, FareClass, FareClassId, IdentityDocument, Operation, Passenger, PassengerId,
    PassengerName, Seat, SeatId, StoreError, TicketStatus, UserId,
};

use crate::map_sqlx_error;

pub(crate) fn column<'r, T>(
    row: &'r PgRow,
    name: &str,
    operation: Operation,
) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|error| map_sqlx_error(error, operation))
}

pub(crate) fn corrupt(entity: &'static str, detail: impl Into<String>) -> StoreError {
    StoreError::CorruptRecord {
        entity,
        detail: detail.into(),
    }
}

pub(crate) fn to_i32(value: u32, what: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| corrupt("ticket", format!("{what} {value} out of range")))
}

pub(crate) fn decode_status(row: &PgRow, operation: Operation) -> Result<TicketStatus, StoreError> {
    let code: i16 = column(row, "status_id", operation)?;
    TicketStatus::from_code(code)
        .ok_or_else(|| corrupt("ticket", format!("unknown status code {code}")))
}

/// Expects `id`, `name`, `seat_count` and `price` columns.
pub(crate) fn decode_fare(row: &PgRow, operation: Operation) -> Result<Fare, StoreError> {
    let seat_count: i32 = column(row, "seat_count", operation)?;
    Ok(Fare {
        fare_class: FareClass {
            id: FareClassId::new(column::<Uuid>(row, "id", operation)?),
            name: column(row, "name", operation)?,
            seat_count: u32::try_from(seat_count)
                .map_err(|_| corrupt("fare class", "negative seat count"))?,
        },
        price: column(row, "price", operation)?,
    })
}

pub(crate) fn decode_seat(row: &PgRow, operation: Operation) -> Result<Seat, StoreError> {
    Ok(Seat {
        id: SeatId::new(column::<Uuid>(row, "id", operation)?),
        fare_class_id: FareClassId::new(column::<Uuid>(row, "fare_class_id", operation)?),
        number: column(row, "number", operation)?,
    })
}

pub(crate) fn decode_passenger(row: &PgRow, operation: Operation) -> Result<Passenger, StoreError> {
    let name: String = column(row, "name", operation)?;
    let identity_document: String = column(row, "identity_document", operation)?;
    Ok(Passenger {
        id: PassengerId::new(column::<Uuid>(row, "id", operation)?),
        user_id: UserId::new(column::<Uuid>(row, "user_id", operation)?),
        name: PassengerName::try_new(name)
            .map_err(|error| corrupt("passenger", error.to_string()))?,
        identity_document: IdentityDocument::try_new(identity_document)
            .map_err(|error| corrupt("passenger", error.to_string()))?,
    })
}
