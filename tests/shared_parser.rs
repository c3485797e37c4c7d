mod common;

use std::thread;

use common::shop;
use odata_parser::{HttpMethod, Parser};

#[test]
fn one_parser_serves_many_threads() {
    let doc = shop();
    let parser = Parser::new(&doc);
    let queries = [
        "$filter=Orders/any(o:o/OrderId%20gt%205)",
        "$expand=Orders($top=1)&$select=Name",
        "$orderby=Age%20desc&$top=3",
        "$search=blue%20OR%20green",
    ];

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let parser = &parser;
                let query = queries[i % queries.len()];
                s.spawn(move || parser.parse(HttpMethod::Get, "/Customers", query))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, result) in results.iter().enumerate() {
        let expected = parser
            .parse(HttpMethod::Get, "/Customers", queries[i % queries.len()])
            .unwrap();
        assert_eq!(result.as_ref().unwrap(), &expected);
    }
}
