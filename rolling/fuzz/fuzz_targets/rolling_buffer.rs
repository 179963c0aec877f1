#![no_main]

use arbitrary::Arbitrary;
use commonware_rolling::{Backing, Config, Error, RollingBuffer};
use libfuzzer_sys::fuzz_target;
use std::{collections::VecDeque, num::NonZeroUsize};

const MAX_CAPACITY: usize = 1_024;
const MAX_CHUNK: usize = 4_096;

#[derive(Arbitrary, Debug)]
enum Operation {
    Put(u16),
    PutSlice(Vec<u16>),
    PutRange(Vec<u16>, usize, usize),
    Take,
    TakeN(usize),
    TakeInto(usize, usize),
    TakeAll,
    ShiftTake(usize),
    Expand(usize),
    Reset,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    native: bool,
    capacity: u16,
    operations: Vec<Operation>,
}

fn fuzz(input: FuzzInput) {
    let capacity = (input.capacity as usize % MAX_CAPACITY) + 1;
    let mut cfg = Config::heap(NonZeroUsize::new(capacity).unwrap());
    if input.native {
        cfg.backing = Backing::Native;
    }
    let mut buffer = RollingBuffer::<u16>::init(cfg).unwrap();
    let mut model = VecDeque::new();

    for op in input.operations {
        match op {
            Operation::Put(value) => {
                buffer.put(value).unwrap();
                model.push_back(value);
            }

            Operation::PutSlice(mut data) => {
                data.truncate(MAX_CHUNK);
                buffer.put_slice(&data).unwrap();
                model.extend(data);
            }

            Operation::PutRange(mut data, offset, len) => {
                data.truncate(MAX_CHUNK);
                let valid = offset
                    .checked_add(len)
                    .is_some_and(|end| end <= data.len());
                match buffer.put_range(&data, offset, len) {
                    Ok(()) => {
                        assert!(valid);
                        model.extend(&data[offset..offset + len]);
                    }
                    Err(Error::InvalidRange(..)) => assert!(!valid),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }

            Operation::Take => match buffer.take() {
                Ok(value) => assert_eq!(Some(value), model.pop_front()),
                Err(Error::Empty) => assert!(model.is_empty()),
                Err(err) => panic!("unexpected error: {err}"),
            },

            Operation::TakeN(n) => match buffer.take_n(n) {
                Ok(values) => {
                    let expected: Vec<u16> = model.drain(..n).collect();
                    assert_eq!(values, expected);
                }
                Err(Error::InsufficientData(..)) => assert!(n == 0 || n > model.len()),
                Err(err) => panic!("unexpected error: {err}"),
            },

            Operation::TakeInto(offset, n) => {
                let mut dst = vec![0u16; MAX_CHUNK];
                match buffer.take_into(&mut dst, offset, n) {
                    Ok(()) => {
                        let expected: Vec<u16> = model.drain(..n).collect();
                        assert_eq!(&dst[offset..offset + n], expected.as_slice());
                    }
                    Err(Error::InvalidRange(..)) => {
                        assert!(offset.checked_add(n).map_or(true, |end| end > MAX_CHUNK));
                    }
                    Err(Error::InsufficientData(..)) => assert!(n == 0 || n > model.len()),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }

            Operation::TakeAll => match buffer.take_all() {
                Ok(values) => assert_eq!(values, model.drain(..).collect::<Vec<_>>()),
                Err(Error::InsufficientData(0, 0)) => assert!(model.is_empty()),
                Err(err) => panic!("unexpected error: {err}"),
            },

            Operation::ShiftTake(step) => match buffer.shift_take_index(step) {
                Ok(()) => {
                    model.drain(..step);
                }
                Err(Error::InsufficientData(..)) => assert!(step > model.len()),
                Err(err) => panic!("unexpected error: {err}"),
            },

            Operation::Expand(increment) => {
                let increment = increment % MAX_CHUNK;
                buffer.expand_capacity(increment).unwrap();
                assert!(buffer.remaining().unwrap() >= increment);
            }

            Operation::Reset => {
                buffer.reset().unwrap();
                model.clear();
            }
        }

        assert_eq!(buffer.size().unwrap(), model.len());
        let capacity = buffer.capacity().unwrap();
        assert!(buffer.take_index().unwrap() < capacity);
        assert_eq!(
            buffer.put_index().unwrap(),
            (buffer.take_index().unwrap() + model.len()) % capacity
        );
    }

    buffer.release();
    buffer.release();
    assert_eq!(buffer.size(), Err(Error::Released));
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
