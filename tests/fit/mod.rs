mod fit_object_tests;
