mod search_scenarios;
