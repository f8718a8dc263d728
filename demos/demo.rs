use tablepipe::*;

fn print_table(table: &Table) {
    let names = table.column_names();
    for name in &names {
        print!("{name:<12}");
    }
    println!();
    println!("{}", "-".repeat(12 * names.len()));

    for row in table.rows() {
        for value in &row {
            let cell = match value {
                Value::Null => "NULL".to_string(),
                other => other.to_string(),
            };
            print!("{cell:<12}");
        }
        println!();
    }
    println!();
}

fn main() -> Result<()> {
    println!("Relational Pipeline Demo\n");

    // Load the two sheets
    let mut catalog = Catalog::new();
    catalog.load(
        "orders",
        &["id", "cust", "amt", "day"],
        &[
            vec!["1", "c1", "60", "2024-01-03"],
            vec!["2", "c2", "20", "2024-01-04"],
            vec!["3", "c1", "70", "2024-02-11"],
            vec!["4", "c3", "150", "2024-02-12"],
            vec!["5", "c2", "30", ""],
            vec!["6", "c9", "500", "2024-03-01"],
        ],
    )?;
    catalog.load(
        "customers",
        &["cust", "name", "day"],
        &[
            vec!["c1", "Ann", "2023-05-01"],
            vec!["c2", "Ben", "2023-06-15"],
            vec!["c3", "Cal", "2023-07-30"],
        ],
    )?;
    println!("Loaded tables: {:?}\n", catalog.names());

    // Left join keeps the order of an unknown customer
    let spec = JoinSpec::new("orders", "customers", "cust", "cust", JoinKind::Left);
    let joined = pipeline::run_join(&catalog, &spec)?;
    println!("orders LEFT JOIN customers:");
    print_table(&joined);

    // Full run, with one bad clause to show diagnostics
    let request = PipelineRequest::join(spec)
        .project(["cust", "name", "amt", "discount"])
        .filter(FilterClause::parse("amt BETWEEN 10, 100")?)
        .filter(FilterClause::parse("name <> 'Cal'")?)
        .aggregate(
            AggregationSpec::new("name", "amt", Reducer::Sum)
                .having(FilterClause::parse("amt > 40")?),
        )
        .sort_by(SortRule::desc("amt"));

    let (result, diagnostics) = run(&catalog, &request);

    println!(
        "Result of {} ({} stages, state {:?}):",
        result.provenance.source, result.provenance.stages_applied, result.provenance.state
    );
    print_table(&result.table);

    println!("Diagnostics:");
    for diagnostic in &diagnostics {
        println!("  - {diagnostic}");
    }

    Ok(())
}
