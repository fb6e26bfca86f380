use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::workflows::applications::repository::RepositoryError;
use crate::workflows::applications::sequence::{
    AllocationError, ApplicationNumber, SequenceAllocator, SequenceCounter,
};
use crate::workflows::applications::{
    ApplicationServiceError, InMemoryApplicationRepository, MAX_APPLICATION_SEQUENCE,
};

#[test]
fn allocator_draws_increasing_numbers() {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let allocator = SequenceAllocator::new(repository);

    let first = allocator.allocate().expect("first number");
    let second = allocator.allocate().expect("second number");

    assert_eq!(first.to_string(), "APP000001");
    assert_eq!(second.to_string(), "APP000002");
    assert!(second > first);
}

#[test]
fn allocator_resumes_after_the_last_issued_number() {
    let repository = Arc::new(InMemoryApplicationRepository::starting_after(41));
    let allocator = SequenceAllocator::new(repository);

    assert_eq!(
        allocator.allocate().expect("number").to_string(),
        "APP000042"
    );
}

#[test]
fn duplicate_numbers_trigger_a_fresh_draw() {
    let repository = Arc::new(StaleCounterRepository::new(
        InMemoryApplicationRepository::starting_after(3),
        vec![1, 2],
    ));
    let allocator = SequenceAllocator::new(Arc::clone(&repository));
    let taken: HashSet<u64> = [1, 2].into_iter().collect();
    let mut seen = Vec::new();

    let assigned = allocator
        .assign(|number| {
            seen.push(number);
            if taken.contains(&number.sequence()) {
                Err(RepositoryError::DuplicateApplicationNumber(number))
            } else {
                Ok(number)
            }
        })
        .expect("third draw succeeds");

    assert_eq!(assigned.to_string(), "APP000004");
    assert_eq!(seen.len(), 3);
}

#[test]
fn allocator_gives_up_after_the_attempt_budget() {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let allocator = SequenceAllocator::with_max_attempts(repository, 3);
    let mut attempts = 0;

    let result: Result<(), _> = allocator.assign(|number| {
        attempts += 1;
        Err(RepositoryError::DuplicateApplicationNumber(number))
    });

    match result {
        Err(AllocationError::Exhausted { attempts: 3 }) => {}
        other => panic!("expected exhausted allocator, got {other:?}"),
    }
    assert_eq!(attempts, 3);
}

#[test]
fn non_duplicate_failures_are_not_retried() {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let allocator = SequenceAllocator::new(Arc::clone(&repository));
    let mut attempts = 0;

    let result: Result<(), _> = allocator.assign(|_| {
        attempts += 1;
        Err(RepositoryError::Unavailable("disk full".to_string()))
    });

    assert!(matches!(
        result,
        Err(AllocationError::Repository(RepositoryError::Unavailable(_)))
    ));
    assert_eq!(attempts, 1);
    // The failed attempt still consumed a counter value; gaps are expected.
    assert_eq!(repository.next_sequence().expect("counter"), 2);
}

#[test]
fn counter_past_six_digits_is_out_of_range() {
    let repository = Arc::new(InMemoryApplicationRepository::starting_after(
        MAX_APPLICATION_SEQUENCE,
    ));
    let allocator = SequenceAllocator::new(repository);

    match allocator.allocate() {
        Err(AllocationError::OutOfRange(value)) => assert_eq!(value, 1_000_000),
        other => panic!("expected out of range, got {other:?}"),
    }
}

#[test]
fn concurrent_allocation_never_repeats_a_number() {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let allocator = Arc::new(SequenceAllocator::new(repository));

    let numbers: Vec<ApplicationNumber> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                scope.spawn(move || {
                    (0..25)
                        .map(|_| allocator.allocate().expect("allocate"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("allocator thread"))
            .collect()
    });

    let unique: HashSet<_> = numbers.iter().copied().collect();
    assert_eq!(numbers.len(), 400);
    assert_eq!(unique.len(), 400);
    assert_eq!(
        numbers.iter().map(|number| number.sequence()).max(),
        Some(400)
    );
}

#[test]
fn service_recovers_from_a_stale_counter() {
    let inner = InMemoryApplicationRepository::default();
    let (seed_service, _seed_uploads) = service_with_repository(Arc::new(inner.clone()));
    let first = seed_service
        .submit_at(intake_request(), submitted_at())
        .expect("seed submission");
    assert_eq!(first.application_number.to_string(), "APP000001");

    // The stale counter hands out 1 again before the live counter takes over.
    let repository = Arc::new(StaleCounterRepository::new(inner, vec![1]));
    let (service, _uploads) = service_with_repository(Arc::clone(&repository));
    let second = service
        .submit_at(intake_request(), submitted_at())
        .expect("retry succeeds");

    assert_eq!(second.application_number.to_string(), "APP000002");
    assert_eq!(repository.inner.len(), 2);
}

#[test]
fn service_reports_exhaustion_when_every_draw_is_taken() {
    let inner = InMemoryApplicationRepository::default();
    let (seed_service, _seed_uploads) = service_with_repository(Arc::new(inner.clone()));
    seed_service
        .submit_at(intake_request(), submitted_at())
        .expect("seed submission");

    let repository = Arc::new(StaleCounterRepository::new(inner, vec![1; 5]));
    let (service, uploads) = service_with_repository(Arc::clone(&repository));

    match service.submit_at(intake_request(), submitted_at()) {
        Err(ApplicationServiceError::Allocation(AllocationError::Exhausted { attempts: 5 })) => {}
        other => panic!("expected exhausted allocation, got {other:?}"),
    }
    assert_eq!(repository.inner.len(), 1);
    assert_eq!(file_count(uploads.path()), 0, "staged files are cleaned up");
}
