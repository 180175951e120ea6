use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use sheet_ingest::data::CellValue;
use sheet_ingest::schema::{ColumnSchema, IntegerWidth, SqlType};
use sheet_ingest::validate::validate_rows;

fn generate_rows(rows: usize) -> Vec<(usize, Vec<CellValue>)> {
    (0..rows)
        .map(|i| {
            let amount = if i % 50 == 0 {
                CellValue::from("n/a")
            } else {
                CellValue::Text(format!("{},{:03}.{:02}", i % 90 + 1, i % 1000, i % 100))
            };
            let opened = CellValue::Text(format!("{:02}/{:02}/2024", i % 28 + 1, i % 12 + 1));
            (
                i + 4,
                vec![
                    CellValue::Text(format!("F-{i:06}")),
                    CellValue::Text(format!("Customer {}", i % 500)),
                    amount,
                    CellValue::Int((i % 120) as i64),
                    opened,
                ],
            )
        })
        .collect()
}

fn columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::from_declaration("Facility_No", "VARCHAR(20)", false, None)
            .expect("facility column"),
        ColumnSchema::from_declaration("Customer_Name", "NVARCHAR(100)", true, None)
            .expect("customer column"),
        ColumnSchema::from_declaration("Amount", "DECIMAL(18,2)", false, Some("((0))".into()))
            .expect("amount column"),
        ColumnSchema::new("Tenor_Months", SqlType::Integer(IntegerWidth::Small)).not_null(),
        ColumnSchema::new("Opened_On", SqlType::Date),
    ]
}

fn bench_validate_rows(c: &mut Criterion) {
    let rows = generate_rows(20_000);
    let schema = columns();
    let refs = schema.iter().collect::<Vec<_>>();

    let mut group = c.benchmark_group("validate_rows");
    group.sample_size(20);
    group.bench_function("20k_rows_5_columns", |b| {
        b.iter_batched(
            || rows.clone(),
            |rows| {
                let report = validate_rows(&rows, &refs);
                black_box(report.errors.len());
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_validate_rows);
criterion_main!(benches);
