// Copyright 2022 the Sorrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A minimal `#import` preprocessor for the WGSL sources.

use std::collections::HashMap;

pub fn preprocess(input: &str, imports: &HashMap<&str, &str>) -> String {
    let mut output = String::with_capacity(input.len());
    for (line_number, line) in input.lines().enumerate() {
        if let Some(directive_start) = line.trim_start().strip_prefix("#import") {
            let import_name = directive_start.trim();
            if let Some(import) = imports.get(import_name) {
                // Imports may import in turn; shared sources are small
                // enough that re-expansion is cheap.
                output.push_str(&preprocess(import, imports));
            } else {
                eprintln!("unknown import `{import_name}` (line {line_number})");
            }
            continue;
        }
        output.push_str(line);
        output.push('\n');
    }
    output
}
