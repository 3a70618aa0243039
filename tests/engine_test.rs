// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Checkout engine public API integration tests.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use ticket_checkout::{
    BookingId, Cart, CartError, CartLine, CartSnapshot, CheckoutConfig, CheckoutEngine, CheckoutError,
    CheckoutStore, EventId, InventoryError, MemoryStore, NewBooking, PaymentInfo, PaymentStatus,
    Reservation, StorageError, TicketType, TicketTypeId, TicketTypeInfo, UserId,
};

// === Helper Functions ===

fn payment() -> PaymentInfo {
    PaymentInfo {
        payment_method: "card".into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        phone: "555-0100".into(),
    }
}

fn make_ticket_type(id: u32, event: u32, price: Decimal, available: u32) -> TicketType {
    TicketType::new(
        TicketTypeId(id),
        EventId(event),
        format!("Ticket {id}"),
        price,
        available,
    )
    .unwrap()
}

fn make_line(event: u32, id: u32, price: Decimal, quantity: u32) -> CartLine {
    CartLine::new(
        EventId(event),
        TicketTypeId(id),
        format!("Ticket {id}"),
        price,
        quantity,
    )
}

fn engine_with(ticket_types: Vec<TicketType>) -> CheckoutEngine<MemoryStore> {
    CheckoutEngine::with_store(
        MemoryStore::with_ticket_types(ticket_types),
        CheckoutConfig::new(dec!(2.50)).unwrap(),
    )
}

/// Everything observable about the store, for before/after comparisons.
fn snapshot_state(engine: &CheckoutEngine<MemoryStore>) -> (Vec<TicketTypeInfo>, usize) {
    (
        engine.store().ledger().ticket_types(),
        engine.store().bookings().len(),
    )
}

/// Store that counts every call and can fail commits on demand.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
    fail_commit: AtomicBool,
}

impl RecordingStore {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CheckoutStore for RecordingStore {
    fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketTypeInfo>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.ticket_type(id)
    }

    fn try_reserve(&self, id: TicketTypeId, quantity: u32) -> Result<Reservation, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.try_reserve(id, quantity)
    }

    fn release(&self, reservation: &Reservation) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release(reservation)
    }

    fn commit(&self, booking: NewBooking) -> Result<BookingId, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::CommitFailed("deadlock victim".into()));
        }
        self.inner.commit(booking)
    }
}

fn recording_engine(ticket_types: Vec<TicketType>) -> CheckoutEngine<RecordingStore> {
    let store = RecordingStore {
        inner: MemoryStore::with_ticket_types(ticket_types),
        ..Default::default()
    };
    CheckoutEngine::with_store(store, CheckoutConfig::default())
}

/// Memory store that parks the first `reserve_all` caller right after its
/// reservation attempt, until the test lets it go.
struct GatedStore {
    inner: MemoryStore,
    park_next: AtomicBool,
    parked: Mutex<mpsc::Sender<()>>,
    resume: Mutex<mpsc::Receiver<()>>,
}

impl CheckoutStore for GatedStore {
    fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketTypeInfo>, StorageError> {
        self.inner.ticket_type(id)
    }

    fn try_reserve(&self, id: TicketTypeId, quantity: u32) -> Result<Reservation, InventoryError> {
        self.inner.try_reserve(id, quantity)
    }

    fn reserve_all(&self, lines: &[(TicketTypeId, u32)]) -> Result<Vec<Reservation>, InventoryError> {
        let result = self.inner.reserve_all(lines);
        if self.park_next.swap(false, Ordering::SeqCst) {
            self.parked.lock().send(()).unwrap();
            self.resume.lock().recv().unwrap();
        }
        result
    }

    fn release(&self, reservation: &Reservation) -> Result<(), StorageError> {
        self.inner.release(reservation)
    }

    fn commit(&self, booking: NewBooking) -> Result<BookingId, StorageError> {
        self.inner.commit(booking)
    }
}

// === End-to-end Scenarios ===

#[test]
fn checkout_books_and_decrements() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 200)]);
    let mut cart = Cart::new();
    cart.add_or_merge(make_line(1, 7, dec!(45.00), 2), 200).unwrap();

    let booking_id = engine.checkout_cart(UserId(1), &mut cart, &payment()).unwrap();

    let booking = engine.store().booking(&booking_id).unwrap();
    assert_eq!(booking.total_amount, dec!(92.50));
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    assert_eq!(booking.payment_method, "card");
    assert_eq!(booking.tickets.len(), 1);
    assert_eq!(booking.tickets[0].ticket_type_id, TicketTypeId(7));
    assert_eq!(booking.tickets[0].quantity, 2);
    assert_eq!(booking.tickets[0].price, dec!(45.00));
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(198));
    assert!(cart.is_empty());
}

#[test]
fn checkout_insufficient_inventory_books_nothing() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 1)]);
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 2)]);

    let result = engine.checkout(UserId(1), &snapshot, &payment());

    assert_eq!(
        result,
        Err(CheckoutError::InsufficientInventory {
            ticket_type_id: TicketTypeId(7)
        })
    );
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(1));
    assert!(engine.store().bookings().is_empty());
}

// === Concurrent Checkouts ===

#[test]
fn refused_checkout_holds_nothing_while_in_flight() {
    let (parked_tx, parked_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel();
    let store = GatedStore {
        inner: MemoryStore::with_ticket_types([
            make_ticket_type(1, 1, dec!(10.00), 5),
            make_ticket_type(2, 1, dec!(10.00), 0),
        ]),
        park_next: AtomicBool::new(true),
        parked: Mutex::new(parked_tx),
        resume: Mutex::new(resume_rx),
    };
    let engine = Arc::new(CheckoutEngine::with_store(store, CheckoutConfig::default()));

    // Wants every ticket of type 1 plus one of the sold out type 2
    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let snapshot = CartSnapshot::from(vec![
                make_line(1, 1, dec!(10.00), 5),
                make_line(1, 2, dec!(10.00), 1),
            ]);
            engine.checkout(UserId(1), &snapshot, &payment())
        })
    };
    parked_rx.recv().unwrap();

    // The first checkout has not returned yet, but holds no ticket of type 1
    let snapshot = CartSnapshot::from(vec![make_line(1, 1, dec!(10.00), 5)]);
    let second = engine.checkout(UserId(2), &snapshot, &payment());

    resume_tx.send(()).unwrap();
    let first = first.join().unwrap();

    assert!(second.is_ok());
    assert_eq!(
        first,
        Err(CheckoutError::InsufficientInventory {
            ticket_type_id: TicketTypeId(2)
        })
    );
    assert_eq!(engine.store().inner.available(&TicketTypeId(1)), Some(0));
    assert_eq!(engine.store().inner.bookings().len(), 1);
}

#[test]
fn concurrent_multi_line_checkouts_never_block_each_other_out() {
    // Every buyer wants both ticket types; only the stock limits sales
    let engine = Arc::new(engine_with(vec![
        make_ticket_type(1, 1, dec!(10.00), 20),
        make_ticket_type(2, 1, dec!(10.00), 20),
    ]));
    let mut handles = vec![];

    for buyer in 0..40u32 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let lines = if buyer % 2 == 0 {
                vec![make_line(1, 1, dec!(10.00), 1), make_line(1, 2, dec!(10.00), 1)]
            } else {
                vec![make_line(1, 2, dec!(10.00), 1), make_line(1, 1, dec!(10.00), 1)]
            };
            engine
                .checkout(UserId(buyer), &CartSnapshot::from(lines), &payment())
                .is_ok()
        }));
    }

    let booked = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(booked, 20);
    assert_eq!(engine.store().available(&TicketTypeId(1)), Some(0));
    assert_eq!(engine.store().available(&TicketTypeId(2)), Some(0));
}

// === Overflow ===

#[test]
fn add_to_cart_overflow_is_a_cart_error() {
    let engine = engine_with(vec![make_ticket_type(7, 1, Decimal::MAX, 10)]);
    let mut cart = Cart::new();

    engine.add_to_cart(&mut cart, EventId(1), TicketTypeId(7), 1).unwrap();
    assert_eq!(
        engine.add_to_cart(&mut cart, EventId(1), TicketTypeId(7), 1),
        Err(CartError::AmountOverflow)
    );
    assert_eq!(cart.lines()[0].quantity, 1);
}

#[test]
fn checkout_overflow_is_refused_without_touching_the_store() {
    // One unit fits in the cart; the service fee pushes the total over
    let engine = recording_engine(vec![make_ticket_type(7, 1, Decimal::MAX, 10)]);
    let mut cart = Cart::new();
    cart.add_or_merge(make_line(1, 7, Decimal::MAX, 1), 10).unwrap();

    let result = engine.checkout_cart(UserId(1), &mut cart, &payment());

    assert_eq!(result, Err(CheckoutError::AmountOverflow));
    assert!(result.unwrap_err().is_client_error());
    assert_eq!(engine.store().calls(), 0);
    assert_eq!(cart.len(), 1);
    assert_eq!(engine.store().inner.available(&TicketTypeId(7)), Some(10));
}

// === Validation ===

#[test]
fn missing_field_makes_no_store_calls() {
    let engine = recording_engine(vec![make_ticket_type(7, 1, dec!(45.00), 200)]);
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 2)]);

    let fields = ["payment_method", "first_name", "last_name", "email", "phone"];
    for field in fields {
        let mut info = payment();
        match field {
            "payment_method" => info.payment_method.clear(),
            "first_name" => info.first_name.clear(),
            "last_name" => info.last_name.clear(),
            "email" => info.email.clear(),
            _ => info.phone.clear(),
        }

        let result = engine.checkout(UserId(1), &snapshot, &info);
        assert_eq!(result, Err(CheckoutError::MissingField(field)));
    }

    assert_eq!(engine.store().calls(), 0);
}

#[test]
fn empty_cart_makes_no_store_calls() {
    let engine = recording_engine(vec![make_ticket_type(7, 1, dec!(45.00), 200)]);
    let mut cart = Cart::new();

    let result = engine.checkout_cart(UserId(1), &mut cart, &payment());

    assert_eq!(result, Err(CheckoutError::EmptyCart));
    assert_eq!(engine.store().calls(), 0);
}

#[test]
fn missing_field_is_reported_before_empty_cart() {
    let engine = engine_with(vec![]);
    let mut info = payment();
    info.email.clear();

    let result = engine.checkout(UserId(1), &CartSnapshot::from(vec![]), &info);
    assert_eq!(result, Err(CheckoutError::MissingField("email")));
}

// === Rollback ===

#[test]
fn failing_line_rolls_back_earlier_reservations() {
    let engine = engine_with(vec![
        make_ticket_type(1, 1, dec!(10.00), 10),
        make_ticket_type(2, 1, dec!(20.00), 10),
        make_ticket_type(3, 1, dec!(30.00), 1),
    ]);
    let snapshot = CartSnapshot::from(vec![
        make_line(1, 1, dec!(10.00), 3),
        make_line(1, 2, dec!(20.00), 4),
        make_line(1, 3, dec!(30.00), 2),
    ]);
    let before = snapshot_state(&engine);

    let result = engine.checkout(UserId(1), &snapshot, &payment());

    assert_eq!(
        result,
        Err(CheckoutError::InsufficientInventory {
            ticket_type_id: TicketTypeId(3)
        })
    );
    assert_eq!(snapshot_state(&engine), before);
}

#[test]
fn unknown_ticket_type_is_insufficient_inventory() {
    let engine = engine_with(vec![make_ticket_type(1, 1, dec!(10.00), 10)]);
    let snapshot = CartSnapshot::from(vec![
        make_line(1, 1, dec!(10.00), 1),
        make_line(1, 42, dec!(10.00), 1),
    ]);

    let result = engine.checkout(UserId(1), &snapshot, &payment());

    assert_eq!(
        result,
        Err(CheckoutError::InsufficientInventory {
            ticket_type_id: TicketTypeId(42)
        })
    );
    assert_eq!(engine.store().available(&TicketTypeId(1)), Some(10));
}

#[test]
fn rejected_checkout_is_repeatable() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 1)]);
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 2)]);
    let expected = Err(CheckoutError::InsufficientInventory {
        ticket_type_id: TicketTypeId(7),
    });

    assert_eq!(engine.checkout(UserId(1), &snapshot, &payment()), expected);
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(1));
    assert_eq!(engine.checkout(UserId(1), &snapshot, &payment()), expected);
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(1));
}

#[test]
fn failed_checkout_leaves_cart_untouched() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 1)]);
    let mut cart = Cart::new();
    cart.add_or_merge(make_line(1, 7, dec!(45.00), 2), 5).unwrap();
    let before = cart.clone();

    let result = engine.checkout_cart(UserId(1), &mut cart, &payment());

    assert!(result.is_err());
    assert_eq!(cart, before);
}

#[test]
fn commit_failure_rolls_back_and_keeps_cart() {
    let engine = recording_engine(vec![
        make_ticket_type(1, 1, dec!(10.00), 10),
        make_ticket_type(2, 1, dec!(20.00), 10),
    ]);
    engine.store().fail_commit.store(true, Ordering::SeqCst);
    let mut cart = Cart::new();
    cart.add_or_merge(make_line(1, 1, dec!(10.00), 2), 10).unwrap();
    cart.add_or_merge(make_line(1, 2, dec!(20.00), 3), 10).unwrap();

    let result = engine.checkout_cart(UserId(1), &mut cart, &payment());

    assert_eq!(
        result,
        Err(CheckoutError::Infrastructure(
            "commit failed: deadlock victim".into()
        ))
    );
    assert!(!result.unwrap_err().is_client_error());
    assert_eq!(cart.len(), 2);
    assert_eq!(engine.store().inner.available(&TicketTypeId(1)), Some(10));
    assert_eq!(engine.store().inner.available(&TicketTypeId(2)), Some(10));
    assert!(engine.store().inner.bookings().is_empty());

    // Retrying from scratch succeeds once storage recovers
    engine.store().fail_commit.store(false, Ordering::SeqCst);
    engine.checkout_cart(UserId(1), &mut cart, &payment()).unwrap();
    assert_eq!(engine.store().inner.available(&TicketTypeId(1)), Some(8));
    assert_eq!(engine.store().inner.available(&TicketTypeId(2)), Some(7));
    assert!(cart.is_empty());
}

// === Booking Contents ===

#[test]
fn booked_price_is_cart_price_not_current_price() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(60.00), 10)]);
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 1)]);

    let id = engine.checkout(UserId(1), &snapshot, &payment()).unwrap();

    let booking = engine.store().booking(&id).unwrap();
    assert_eq!(booking.tickets[0].price, dec!(45.00));
    assert_eq!(booking.total_amount, dec!(47.50));
}

#[test]
fn multi_event_cart_books_under_first_event() {
    let engine = engine_with(vec![
        make_ticket_type(7, 1, dec!(45.00), 10),
        make_ticket_type(9, 2, dec!(20.00), 10),
    ]);
    let snapshot = CartSnapshot::from(vec![
        make_line(1, 7, dec!(45.00), 1),
        make_line(2, 9, dec!(20.00), 2),
    ]);

    let id = engine.checkout(UserId(1), &snapshot, &payment()).unwrap();

    let booking = engine.store().booking(&id).unwrap();
    assert_eq!(booking.event_id, EventId(1));
    assert_eq!(booking.tickets.len(), 2);
    assert_eq!(booking.tickets[1].ticket_type_id, TicketTypeId(9));
    assert_eq!(booking.total_amount, dec!(87.50));
    assert_eq!(booking.subtotal() + booking.service_fee, booking.total_amount);
}

#[test]
fn booking_records_trimmed_contact() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 10)]);
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 1)]);
    let mut info = payment();
    info.email = "  ada@example.com ".into();

    let id = engine.checkout(UserId(3), &snapshot, &info).unwrap();

    let booking = engine.store().booking(&id).unwrap();
    assert_eq!(booking.user_id, UserId(3));
    assert_eq!(booking.contact.email, "ada@example.com");
    assert_eq!(booking.contact.last_name, "Lovelace");
}

#[test]
fn zero_service_fee_total_is_subtotal() {
    let engine = CheckoutEngine::with_store(
        MemoryStore::with_ticket_types([make_ticket_type(7, 1, dec!(45.00), 10)]),
        CheckoutConfig::new(Decimal::ZERO).unwrap(),
    );
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 2)]);

    let id = engine.checkout(UserId(1), &snapshot, &payment()).unwrap();
    assert_eq!(engine.store().booking(&id).unwrap().total_amount, dec!(90.00));
}

#[test]
fn bookings_are_listed_per_user() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 10)]);
    let snapshot = CartSnapshot::from(vec![make_line(1, 7, dec!(45.00), 1)]);

    let first = engine.checkout(UserId(1), &snapshot, &payment()).unwrap();
    engine.checkout(UserId(2), &snapshot, &payment()).unwrap();
    let third = engine.checkout(UserId(1), &snapshot, &payment()).unwrap();

    let ids: Vec<_> = engine
        .store()
        .bookings_for_user(UserId(1))
        .iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec![first, third]);
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(7));
}

// === Cart Through The Engine ===

#[test]
fn add_to_cart_denormalizes_name_and_price() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 3)]);
    let mut cart = Cart::new();

    engine
        .add_to_cart(&mut cart, EventId(1), TicketTypeId(7), 2)
        .unwrap();

    assert_eq!(cart.lines()[0].name, "Ticket 7");
    assert_eq!(cart.lines()[0].price, dec!(45.00));
    // Adding to a cart reserves nothing
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(3));
}

#[test]
fn advisory_check_can_be_stale_but_checkout_is_authoritative() {
    let engine = engine_with(vec![make_ticket_type(7, 1, dec!(45.00), 2)]);
    let mut first = Cart::new();
    let mut second = Cart::new();

    // Both carts pass the advisory check
    engine.add_to_cart(&mut first, EventId(1), TicketTypeId(7), 2).unwrap();
    engine.add_to_cart(&mut second, EventId(1), TicketTypeId(7), 2).unwrap();

    engine.checkout_cart(UserId(1), &mut first, &payment()).unwrap();
    let result = engine.checkout_cart(UserId(2), &mut second, &payment());

    assert_eq!(
        result,
        Err(CheckoutError::InsufficientInventory {
            ticket_type_id: TicketTypeId(7)
        })
    );
    assert_eq!(second.len(), 1);
    assert_eq!(engine.store().available(&TicketTypeId(7)), Some(0));
}
