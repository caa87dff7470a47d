// Loan transition benchmarks.
//
// Covers coin parsing, the pure state machine, and full keeper round
// trips over the in-memory and sled backends.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lendbook_contracts::machine;
use lendbook_contracts::{
    Loan, LoanId, LoanKeeper, LoanRequest, LoanStore, MemoryLoanStore, Operation, SledLoanStore,
};
use lendbook_protocol::storage::LedgerDb;
use lendbook_protocol::vault::{Address, Bank, Coins, Ledger};

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn coins(s: &str) -> Coins {
    s.parse().unwrap()
}

fn request() -> LoanRequest {
    LoanRequest {
        borrower: addr("borrower"),
        amount: coins("100stake"),
        fee: coins("5stake"),
        collateral: coins("50atom,10ibc/transfer/channel-0/uosmo"),
        deadline: 1_000_000,
    }
}

fn bench_parse_coins(c: &mut Criterion) {
    c.bench_function("coins/parse_three_denoms", |b| {
        b.iter(|| "100stake, 50atom ,10ibc/transfer/channel-0/uosmo".parse::<Coins>().unwrap());
    });
}

fn bench_machine(c: &mut Criterion) {
    let loan = Loan::requested(
        LoanId(1),
        addr("borrower"),
        &coins("100stake"),
        &coins("5stake"),
        &coins("50atom"),
        1000,
    );
    let approved = machine::approve(&loan, &addr("lender")).unwrap().loan;

    c.bench_function("machine/approve", |b| {
        b.iter(|| machine::apply(&loan, Operation::Approve, &addr("lender"), 10).unwrap());
    });
    c.bench_function("machine/repay", |b| {
        b.iter(|| machine::apply(&approved, Operation::Repay, &addr("borrower"), 10).unwrap());
    });
}

/// request -> approve -> repay, `n` loans per iteration.
fn run_lifecycles<L: Ledger, S: LoanStore>(keeper: &LoanKeeper<L, S>, n: usize) {
    for _ in 0..n {
        let id = keeper.request_loan(request()).unwrap().loan_id;
        keeper.approve(id, &addr("lender")).unwrap();
        keeper.repay(id, &addr("borrower")).unwrap();
    }
}

/// Collateral is returned each round, so only the fees scale with `n`.
fn fund(mint: impl Fn(&Address, &Coins), n: usize) {
    let n = n as u128;
    let fees = Coins::single(5 * n, "stake").unwrap();
    let collateral = request().collateral;
    mint(&addr("borrower"), &fees.checked_add(&collateral).unwrap());
    mint(&addr("lender"), &Coins::single(100 * n, "stake").unwrap());
}

fn bench_keeper_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("keeper/memory_lifecycle");
    for size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_with_setup(
                || {
                    let bank = Bank::new();
                    fund(|a, c| bank.mint(a, c).unwrap(), size);
                    LoanKeeper::new(bank, MemoryLoanStore::new())
                },
                |keeper| run_lifecycles(&keeper, size),
            );
        });
    }
    group.finish();
}

fn bench_keeper_sled(c: &mut Criterion) {
    let mut group = c.benchmark_group("keeper/sled_lifecycle");
    group.sample_size(20);
    for size in [1usize, 10] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_with_setup(
                || {
                    let db = Arc::new(LedgerDb::open_temporary().unwrap());
                    fund(|a, c| db.mint(a, c).unwrap(), size);
                    let store = SledLoanStore::new(&db).unwrap();
                    LoanKeeper::new(db, store)
                },
                |keeper| run_lifecycles(&keeper, size),
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_coins,
    bench_machine,
    bench_keeper_memory,
    bench_keeper_sled,
);
criterion_main!(benches);
